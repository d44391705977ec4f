// settlement/server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use settlement::ledger::OrderStatus;
use tracing::instrument;

use crate::errors::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
  pub status: OrderStatus,
}

#[instrument(name = "handler::get_order", skip(app_state))]
pub async fn get_order_handler(app_state: web::Data<AppState>, order_number: web::Path<String>) -> Result<HttpResponse> {
  let order = app_state
    .ledger
    .find(&order_number)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("order {}", order_number.as_str())))?;
  Ok(HttpResponse::Ok().json(order))
}

/// Operator transitions: fulfillment steps or cancellation. Payment state is
/// never set here; it only changes through reconciliation.
#[instrument(name = "handler::change_order_status", skip(app_state, req), fields(target = %req.status))]
pub async fn change_order_status_handler(
  app_state: web::Data<AppState>,
  order_number: web::Path<String>,
  req: web::Json<StatusChangeRequest>,
) -> Result<HttpResponse> {
  let order = match req.status {
    OrderStatus::Cancelled => app_state.ledger.cancel(&order_number).await?,
    target => app_state.ledger.advance_fulfillment(&order_number, target).await?,
  };
  Ok(HttpResponse::Ok().json(order))
}
