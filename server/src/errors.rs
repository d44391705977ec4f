// settlement/server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use settlement::error::{GatewayError, LedgerError, ReconcileError};
use thiserror::Error;

/// What the customer sees when a collection could not be started. The
/// provider's own text only goes to the log.
pub const PAYMENT_INITIATION_FAILED: &str = "payment initiation failed, try again";

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Payment Gateway Error: {0}")]
  Gateway(#[from] GatewayError),

  /// Transient; the caller (or the provider's redelivery) should retry.
  #[error("Service Unavailable: {0}")]
  Unavailable(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<LedgerError> for AppError {
  fn from(err: LedgerError) -> Self {
    match err {
      LedgerError::UnknownOrder { order_number } => AppError::NotFound(format!("order {order_number}")),
      LedgerError::InvalidOrder(m) => AppError::Validation(m),
      e @ (LedgerError::InvalidTransition { .. } | LedgerError::DuplicateOrder { .. }) => AppError::Conflict(e.to_string()),
      e if e.is_transient() => AppError::Unavailable(e.to_string()),
      e => AppError::Internal(e.to_string()),
    }
  }
}

impl From<ReconcileError> for AppError {
  fn from(err: ReconcileError) -> Self {
    match err {
      ReconcileError::Malformed(m) => AppError::Validation(m),
      ReconcileError::SignatureRejected(m) => AppError::Validation(format!("signature rejected: {m}")),
      ReconcileError::Ledger(e) => e.into(),
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
      AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    // Log the full error when it's turned into a response
    tracing::error!(application_error = %self, "Responding with error");
    let body = match self {
      AppError::Validation(m) | AppError::NotFound(m) | AppError::Conflict(m) => json!({"error": m}),
      AppError::Gateway(_) => json!({"error": PAYMENT_INITIATION_FAILED}),
      AppError::Unavailable(_) => json!({"error": "temporarily unavailable, retry later"}),
      AppError::Config(m) => json!({"error": "Configuration issue", "detail": m}),
      AppError::Sqlx(_) => json!({"error": "Database operation failed"}),
      AppError::Internal(_) => json!({"error": "An internal error occurred"}),
    };
    HttpResponse::build(self.status_code()).json(body)
  }
}

// Define a Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
