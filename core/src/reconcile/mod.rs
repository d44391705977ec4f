//! Drivers of payment outcomes: the webhook handler and the polling fallback.
//! Both converge on `OrderLedger::apply_payment_outcome`.

pub mod handler;
pub mod poller;

pub use handler::{
  parse_notification, Acknowledgement, ReconciliationHandler, SignatureVerifier, UnverifiedSignatures,
  ValidNotification, WebhookNotification,
};
pub use poller::{PaymentPoller, PollPolicy, PollResult, SweepReport};
