// src/lib.rs

//! Settlement: reconciles an asynchronous mobile-money provider with the
//! lifecycle of internal orders.
//!
//!  - `geo`: delivery distance, tiered fee and ETA.
//!  - `gateway`: token exchange, collection and status polling against the
//!    aggregator, with a single-flight token cache.
//!  - `ledger`: the order/payment state machine; the only writer of order state.
//!  - `reconcile`: webhook handling and the polling fallback, both feeding the
//!    ledger.

pub mod error;
pub mod gateway;
pub mod geo;
pub mod ledger;
pub mod reconcile;

// --- Re-exports for the Public API ---

pub use crate::error::{GatewayError, GatewayResult, LedgerError, LedgerResult, ReconcileError};
pub use crate::gateway::{Collection, CollectionRequest, GatewayClient, GatewayConfig, PaymentGateway, StatusReport};
pub use crate::geo::{Coordinates, DeliveryQuote, VendorDeliveryProfile};
pub use crate::ledger::{
  Disposition, InMemoryOrderStore, LogNotifier, NewOrder, Order, OrderLedger, OrderStatus, OrderStore, PaymentApplication,
  PaymentMethod, PaymentOutcome, PaymentStatus, SettlementNotifier, SharedOrderStore,
};
pub use crate::reconcile::{
  Acknowledgement, PaymentPoller, PollPolicy, PollResult, ReconciliationHandler, SignatureVerifier, SweepReport,
  UnverifiedSignatures,
};
