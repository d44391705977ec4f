// settlement/src/reconcile/handler.rs

//! Inbound payment notifications.
//!
//! Steps, in order: verify signature, parse payload, map the provider status,
//! apply through the ledger, acknowledge. Once a payload is structurally valid
//! it is always acknowledged, unknown orders included, so the provider does
//! not retry forever. Only transient ledger failures ask for redelivery.

use crate::error::ReconcileError;
use crate::gateway::outcome_from_provider;
use crate::ledger::{Disposition, OrderLedger, PaymentApplication, PaymentOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Notification body as the provider sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
  pub reference: Option<String>,
  pub status: Option<String>,
  pub external_reference: Option<String>,
}

/// A notification that passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidNotification {
  pub provider_reference: String,
  pub external_reference: String,
  pub outcome: PaymentOutcome,
  pub raw_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {
  pub received: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub updated: Option<Uuid>,
  #[serde(skip)]
  pub disposition: Option<Disposition>,
}

/// Decides whether a payload may be trusted.
///
/// Whether the provider signs its notifications, and how, is still to be
/// confirmed. Until then deployments run `UnverifiedSignatures`, which accepts
/// everything and says so in the log.
pub trait SignatureVerifier: Send + Sync {
  fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<(), ReconcileError>;
}

#[derive(Debug, Default, Clone)]
pub struct UnverifiedSignatures;

impl SignatureVerifier for UnverifiedSignatures {
  fn verify(&self, _payload: &[u8], signature: Option<&str>) -> Result<(), ReconcileError> {
    warn!(
      signature_present = signature.is_some(),
      "Webhook signature NOT verified; payload accepted without authentication."
    );
    Ok(())
  }
}

pub struct ReconciliationHandler {
  ledger: Arc<OrderLedger>,
  verifier: Arc<dyn SignatureVerifier>,
}

impl ReconciliationHandler {
  pub fn new(ledger: Arc<OrderLedger>, verifier: Arc<dyn SignatureVerifier>) -> Self {
    Self { ledger, verifier }
  }

  /// Handles one delivery. `Err` values with `is_transient()` should become a
  /// retryable response; every other `Err` is a client error.
  #[instrument(
    name = "ReconciliationHandler::handle",
    skip(self, payload, signature),
    fields(payload_len = payload.len()),
    err(Display)
  )]
  pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<Acknowledgement, ReconcileError> {
    self.verifier.verify(payload, signature)?;
    let notification = parse_notification(payload)?;
    self.apply(notification, Utc::now()).await
  }

  /// Applies an already validated notification observed at `observed_at`.
  pub async fn apply(
    &self,
    notification: ValidNotification,
    observed_at: DateTime<Utc>,
  ) -> Result<Acknowledgement, ReconcileError> {
    let application = self
      .ledger
      .apply_payment_outcome(
        &notification.external_reference,
        &notification.provider_reference,
        notification.outcome,
        observed_at,
      )
      .await?;

    Ok(acknowledge(&notification, application))
  }
}

fn acknowledge(notification: &ValidNotification, application: PaymentApplication) -> Acknowledgement {
  match application.disposition {
    Disposition::UnknownOrder => {
      // Alerted by the ledger's notifier; the provider only sees a receipt.
      warn!(
        external_reference = %notification.external_reference,
        "Acknowledging notification for unknown order."
      );
    }
    disposition => {
      info!(
        external_reference = %notification.external_reference,
        ?disposition,
        applied = application.applied,
        "Notification reconciled."
      );
    }
  }
  Acknowledgement {
    received: true,
    updated: application.order_id,
    disposition: Some(application.disposition),
  }
}

/// Parses and validates a notification body. Unrecognized statuses are
/// treated as pending.
pub fn parse_notification(payload: &[u8]) -> Result<ValidNotification, ReconcileError> {
  let raw: WebhookNotification =
    serde_json::from_slice(payload).map_err(|e| ReconcileError::Malformed(format!("invalid JSON payload: {e}")))?;

  let provider_reference = non_empty(raw.reference).ok_or_else(|| ReconcileError::Malformed("missing reference".into()))?;
  let external_reference =
    non_empty(raw.external_reference).ok_or_else(|| ReconcileError::Malformed("missing external_reference".into()))?;

  let outcome = match raw.status.as_deref().and_then(outcome_from_provider) {
    Some(outcome) => outcome,
    None => {
      warn!(status = ?raw.status, %external_reference, "Unrecognized webhook status treated as PENDING.");
      PaymentOutcome::Pending
    }
  };

  Ok(ValidNotification {
    provider_reference,
    external_reference,
    outcome,
    raw_status: raw.status,
  })
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
