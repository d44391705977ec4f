// settlement/server/src/services/mod.rs

pub mod receipt_mock;

pub use receipt_mock::MockReceiptNotifier;
