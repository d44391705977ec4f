// settlement/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

use crate::ledger::{OrderStatus, PaymentStatus};

/// Failures talking to the mobile-money aggregator.
///
/// `Clone` so that a single failed token refresh can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
  /// Credentials were refused. Needs operator action, retrying will not help.
  #[error("Gateway rejected credentials: {0}")]
  AuthRejected(String),

  /// Network failure, timeout or 5xx. Retryable with backoff.
  #[error("Gateway unavailable: {0}")]
  Unavailable(String),

  /// The provider refused the request itself (bad phone number, bad amount).
  #[error("Gateway rejected request: {0}")]
  Rejected(String),
}

impl GatewayError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, GatewayError::Unavailable(_))
  }
}

impl From<reqwest::Error> for GatewayError {
  fn from(err: reqwest::Error) -> Self {
    GatewayError::Unavailable(err.to_string())
  }
}

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("Unknown order: {order_number}")]
  UnknownOrder { order_number: String },

  #[error("Order {order_number}: cannot move from {from:?}/{payment:?} to {to:?}")]
  InvalidTransition {
    order_number: String,
    from: OrderStatus,
    payment: PaymentStatus,
    to: OrderStatus,
  },

  #[error("Invalid order: {0}")]
  InvalidOrder(String),

  #[error("Order number already exists: {order_number}")]
  DuplicateOrder { order_number: String },

  /// The optimistic version check kept losing. Transient; the whole delivery
  /// may be retried later.
  #[error("Order {order_number}: concurrent update conflict persisted after {attempts} attempts")]
  ConflictRetryExhausted { order_number: String, attempts: u32 },

  #[error("Order store unavailable. Source: {source}")]
  Store {
    #[source]
    source: AnyhowError,
  },
}

impl LedgerError {
  pub fn is_transient(&self) -> bool {
    matches!(self, LedgerError::ConflictRetryExhausted { .. } | LedgerError::Store { .. })
  }
}

impl From<AnyhowError> for LedgerError {
  fn from(err: AnyhowError) -> Self {
    LedgerError::Store { source: err }
  }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error("Malformed webhook payload: {0}")]
  Malformed(String),

  #[error("Webhook signature rejected: {0}")]
  SignatureRejected(String),

  #[error(transparent)]
  Ledger(#[from] LedgerError),
}

impl ReconcileError {
  /// Whether the provider should be told to redeliver.
  pub fn is_transient(&self) -> bool {
    match self {
      ReconcileError::Ledger(e) => e.is_transient(),
      _ => false,
    }
  }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
