// settlement/src/geo.rs

//! Delivery pricing from vendor and customer coordinates.
//!
//! Everything here is pure and deterministic. Coordinates are trusted input;
//! NaN in, NaN-derived garbage out.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Surcharge per started kilometer beyond the free radius (XAF).
pub const SURCHARGE_PER_KM: i64 = 500;

/// Fixed preparation/dispatch time before distance is accounted for.
pub const BASE_DELIVERY_MINUTES: u32 = 30;
pub const MINUTES_PER_KM: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub lat: f64,
  pub lng: f64,
}

impl Coordinates {
  pub const fn new(lat: f64, lng: f64) -> Self {
    Self { lat, lng }
  }
}

/// How a vendor prices delivery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VendorDeliveryProfile {
  pub coordinates: Coordinates,
  pub base_delivery_fee: i64,
  pub delivery_radius_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeliveryQuote {
  pub distance_km: f64,
  pub fee: i64,
  pub eta_minutes: u32,
}

/// Great-circle distance (haversine) in kilometers.
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
  let d_lat = (b.lat - a.lat).to_radians();
  let d_lng = (b.lng - a.lng).to_radians();
  let h = (d_lat / 2.0).sin().powi(2) + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
  let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
  EARTH_RADIUS_KM * c
}

/// Tiered fee for an already computed distance.
///
/// Inside the free radius the base fee applies unchanged. Past it, every
/// started kilometer costs one full surcharge unit: 0.1 km over is 1 unit.
pub fn fee_for_distance(distance_km: f64, base_fee: i64, free_radius_km: f64) -> i64 {
  if distance_km <= free_radius_km {
    return base_fee;
  }
  let extra_km = (distance_km - free_radius_km).ceil() as i64;
  base_fee + extra_km * SURCHARGE_PER_KM
}

pub fn delivery_fee(vendor: Coordinates, customer: Coordinates, base_fee: i64, free_radius_km: f64) -> i64 {
  fee_for_distance(distance_km(vendor, customer), base_fee, free_radius_km)
}

pub fn estimate_delivery_minutes(distance_km: f64) -> u32 {
  BASE_DELIVERY_MINUTES + (distance_km.ceil() as u32) * MINUTES_PER_KM
}

pub fn quote(profile: &VendorDeliveryProfile, customer: Coordinates) -> DeliveryQuote {
  let distance_km = distance_km(profile.coordinates, customer);
  DeliveryQuote {
    distance_km,
    fee: fee_for_distance(distance_km, profile.base_delivery_fee, profile.delivery_radius_km),
    eta_minutes: estimate_delivery_minutes(distance_km),
  }
}
