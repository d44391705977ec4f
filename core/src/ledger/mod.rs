//! Order and payment state, and the single authority that mutates it.

pub mod in_memory;
pub mod notify;
pub mod order;
pub mod service;
pub mod store;

pub use in_memory::InMemoryOrderStore;
pub use notify::{LogNotifier, SettlementNotifier};
pub use order::{
  generate_order_number, NewOrder, Order, OrderStatus, PaymentMethod, PaymentOutcome, PaymentStatus, UnknownVariant,
};
pub use service::{Disposition, OrderLedger, PaymentApplication, DEFAULT_MAX_CAS_ATTEMPTS};
pub use store::{OrderStore, SharedOrderStore};
