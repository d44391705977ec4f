// settlement/server/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use settlement::gateway::{Collection, CollectionRequest};
use settlement::geo::{self, Coordinates, VendorDeliveryProfile};
use settlement::ledger::{NewOrder, Order, PaymentMethod};
use settlement::reconcile::PollResult;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::delivery_handlers::{validate_coordinates, validate_profile};
use crate::errors::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
  pub vendor: VendorDeliveryProfile,
  pub customer: Coordinates,
  /// Goods total before delivery, XAF.
  pub subtotal: i64,
  pub phone_number: String,
  pub payment_method: PaymentMethod,
  pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RetryPaymentRequest {
  pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
  pub order_id: Uuid,
  pub order_number: String,
  pub delivery_fee: i64,
  pub total_amount: i64,
  pub distance_km: f64,
  pub eta_minutes: u32,
  pub provider_reference: String,
  pub ussd_code: Option<String>,
  pub message: &'static str,
}

const CONFIRM_ON_PHONE: &str = "Payment initiated. Confirm the prompt on your phone.";

fn validate_phone(phone_number: &str) -> Result<()> {
  let digits = phone_number.trim().trim_start_matches('+');
  if digits.len() < 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
    return Err(AppError::Validation("phone_number must be digits in international format".to_string()));
  }
  Ok(())
}

/// Starts a collection for `order` and records the provider reference. The
/// polling fallback is started in the background for the new reference.
async fn collect_for_order(
  app_state: &AppState,
  order: &Order,
  phone_number: &str,
  description: String,
) -> Result<Collection> {
  let request = CollectionRequest {
    method: order.payment_method,
    amount: order.total_amount,
    phone_number: phone_number.trim().trim_start_matches('+').to_string(),
    external_reference: order.order_number.clone(),
    description,
    currency: None,
  };

  let collection = match app_state.gateway.initiate_payment(&request).await {
    Ok(collection) => collection,
    Err(e) => {
      // Order stays PENDING/PENDING without a reference; the customer may retry.
      warn!(order_number = %order.order_number, error = %e, retryable = e.is_retryable(), "Payment initiation failed.");
      return Err(AppError::Gateway(e));
    }
  };

  app_state
    .ledger
    .attach_provider_reference(&order.order_number, &collection.provider_reference)
    .await?;

  let poller = app_state.poller.clone();
  let order_number = order.order_number.clone();
  let provider_reference = collection.provider_reference.clone();
  actix_web::rt::spawn(async move {
    match poller.poll_until_settled(&order_number, &provider_reference).await {
      Ok(PollResult::Settled(application)) => {
        info!(%order_number, disposition = ?application.disposition, "Polling fallback settled payment.")
      }
      Ok(PollResult::Exhausted { attempts }) => {
        warn!(%order_number, attempts, "Polling fallback gave up; payment left pending.")
      }
      Ok(PollResult::Resolved { checks }) => {
        info!(%order_number, checks, "Polling fallback stopped; order settled elsewhere.")
      }
      Err(e) => warn!(%order_number, error = %e, "Polling fallback failed."),
    }
  });

  Ok(collection)
}

#[instrument(
  name = "handler::checkout",
  skip(app_state, req),
  fields(payment_method = %req.payment_method, subtotal = req.subtotal)
)]
pub async fn checkout_handler(app_state: web::Data<AppState>, req: web::Json<CheckoutRequest>) -> Result<HttpResponse> {
  let req = req.into_inner();
  validate_profile(&req.vendor)?;
  validate_coordinates("customer", &req.customer)?;
  validate_phone(&req.phone_number)?;
  if req.subtotal <= 0 {
    return Err(AppError::Validation("subtotal must be positive".to_string()));
  }

  let quote = geo::quote(&req.vendor, req.customer);
  let total_amount = req
    .subtotal
    .checked_add(quote.fee)
    .ok_or_else(|| AppError::Validation("order total is too large".to_string()))?;

  let order = app_state
    .ledger
    .open_order(NewOrder {
      order_number: None,
      payment_method: req.payment_method,
      total_amount,
      delivery_fee: quote.fee,
    })
    .await?;
  info!(order_number = %order.order_number, distance_km = quote.distance_km, delivery_fee = quote.fee, "Checkout order opened.");

  let description = req
    .description
    .filter(|d| !d.trim().is_empty())
    .unwrap_or_else(|| format!("Order {}", order.order_number));
  let collection = collect_for_order(&app_state, &order, &req.phone_number, description).await?;

  Ok(HttpResponse::Created().json(CheckoutResponse {
    order_id: order.id,
    order_number: order.order_number,
    delivery_fee: order.delivery_fee,
    total_amount: order.total_amount,
    distance_km: quote.distance_km,
    eta_minutes: quote.eta_minutes,
    provider_reference: collection.provider_reference,
    ussd_code: collection.ussd_prompt,
    message: CONFIRM_ON_PHONE,
  }))
}

/// New collection attempt for an unpaid order, e.g. after a failed or
/// abandoned prompt.
#[instrument(name = "handler::retry_payment", skip(app_state, req))]
pub async fn retry_payment_handler(
  app_state: web::Data<AppState>,
  order_number: web::Path<String>,
  req: web::Json<RetryPaymentRequest>,
) -> Result<HttpResponse> {
  let order_number = order_number.into_inner();
  validate_phone(&req.phone_number)?;

  let order = app_state
    .ledger
    .find(&order_number)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("order {order_number}")))?;
  if order.is_paid() || order.status.is_terminal() {
    return Err(AppError::Conflict(format!(
      "order {} is {}/{}; no payment needed",
      order.order_number, order.status, order.payment_status
    )));
  }

  let description = format!("Order {}", order.order_number);
  let collection = collect_for_order(&app_state, &order, &req.phone_number, description).await?;

  Ok(HttpResponse::Accepted().json(serde_json::json!({
    "order_number": order.order_number,
    "provider_reference": collection.provider_reference,
    "ussd_code": collection.ussd_prompt,
    "message": CONFIRM_ON_PHONE,
  })))
}
