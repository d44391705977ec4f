//! Bridge to the mobile-money aggregator.
//!
//! The provider speaks a two-step protocol: exchange credentials for a token,
//! then call `collect/` or `transaction/{reference}/` with it. `GatewayClient`
//! hides both steps and the token lifecycle behind `PaymentGateway`.

pub mod client;
pub mod token;

pub use client::GatewayClient;
pub use token::{GatewayToken, TokenCache};

use crate::error::GatewayResult;
use crate::ledger::{PaymentMethod, PaymentOutcome};
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://demo.campay.net/api";
pub const DEFAULT_CURRENCY: &str = "XAF";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
  /// Regional currency unless overridden per deployment or per request.
  pub currency: String,
  pub request_timeout: Duration,
  /// Used when the token response does not say how long the token lives.
  pub token_ttl: Duration,
}

impl GatewayConfig {
  pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
      username: username.into(),
      password: password.into(),
      currency: DEFAULT_CURRENCY.to_string(),
      request_timeout: Duration::from_secs(15),
      token_ttl: Duration::from_secs(50 * 60),
    }
  }

  pub(crate) fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
  pub method: PaymentMethod,
  /// Whole XAF units; sent to the provider as a decimal string.
  pub amount: i64,
  pub phone_number: String,
  /// The order number.
  pub external_reference: String,
  pub description: String,
  pub currency: Option<String>,
}

/// An accepted collection. The caller persists `provider_reference` on the
/// order; the USSD prompt goes back to the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
  pub provider_reference: String,
  pub ussd_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
  pub outcome: PaymentOutcome,
  pub message: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn initiate_payment(&self, request: &CollectionRequest) -> GatewayResult<Collection>;

  async fn check_status(&self, provider_reference: &str) -> GatewayResult<StatusReport>;
}

/// Provider status vocabulary to ledger outcomes. `None` for anything outside
/// the known vocabulary; callers treat that as pending.
pub fn outcome_from_provider(status: &str) -> Option<PaymentOutcome> {
  match status.trim() {
    "SUCCESSFUL" => Some(PaymentOutcome::Successful),
    "FAILED" => Some(PaymentOutcome::Failed),
    "PENDING" => Some(PaymentOutcome::Pending),
    _ => None,
  }
}
