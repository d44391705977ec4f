// settlement/server/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, instrument, warn};

use crate::errors::{AppError, Result};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-campay-signature";

/// Payment notifications from the aggregator.
///
/// Every structurally valid delivery gets a 200 with `{received: true}`, even
/// for unknown orders; otherwise the provider keeps retrying. Malformed or
/// rejected payloads get a 400, and a 503 is returned only when the ledger
/// could not commit, so the provider redelivers later.
#[instrument(
  name = "handler::payment_webhook",
  skip(app_state, req, body),
  fields(payload_len = body.len(), signed = req.headers().contains_key(SIGNATURE_HEADER))
)]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse> {
  let signature = req
    .headers()
    .get(SIGNATURE_HEADER)
    .and_then(|h_val| h_val.to_str().ok());

  match app_state.reconciler.handle(&body, signature).await {
    Ok(ack) => {
      info!(updated = ?ack.updated, disposition = ?ack.disposition, "Webhook acknowledged.");
      Ok(HttpResponse::Ok().json(ack))
    }
    Err(e) => {
      if e.is_transient() {
        warn!(error = %e, "Webhook could not be committed; asking for redelivery.");
      }
      Err(AppError::from(e))
    }
  }
}
