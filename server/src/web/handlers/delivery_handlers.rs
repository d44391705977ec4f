// settlement/server/src/web/handlers/delivery_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use settlement::geo::{self, Coordinates, VendorDeliveryProfile};
use tracing::instrument;

use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
  pub vendor: VendorDeliveryProfile,
  pub customer: Coordinates,
}

pub(crate) fn validate_coordinates(label: &str, c: &Coordinates) -> Result<()> {
  if !c.lat.is_finite() || !c.lng.is_finite() || c.lat.abs() > 90.0 || c.lng.abs() > 180.0 {
    return Err(AppError::Validation(format!("{label} coordinates are out of range")));
  }
  Ok(())
}

pub(crate) fn validate_profile(profile: &VendorDeliveryProfile) -> Result<()> {
  validate_coordinates("vendor", &profile.coordinates)?;
  if profile.base_delivery_fee < 0 {
    return Err(AppError::Validation("base_delivery_fee must not be negative".to_string()));
  }
  if !profile.delivery_radius_km.is_finite() || profile.delivery_radius_km < 0.0 {
    return Err(AppError::Validation("delivery_radius_km must not be negative".to_string()));
  }
  Ok(())
}

#[instrument(name = "handler::delivery_quote", skip(req))]
pub async fn delivery_quote_handler(req: web::Json<QuoteRequest>) -> Result<HttpResponse> {
  validate_profile(&req.vendor)?;
  validate_coordinates("customer", &req.customer)?;
  Ok(HttpResponse::Ok().json(geo::quote(&req.vendor, req.customer)))
}
