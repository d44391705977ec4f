// settlement/src/ledger/store.rs

//! Persistence port for orders.
//!
//! Only `OrderLedger` calls these methods. Implementations must make
//! `compare_and_swap` atomic: the write lands only if the stored version still
//! equals `expected_version`, and the stored version becomes
//! `expected_version + 1`.

use super::order::Order;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Inserts a new order. Returns `false` if the order number is taken.
  async fn insert(&self, order: &Order) -> anyhow::Result<bool>;

  async fn find_by_number(&self, order_number: &str) -> anyhow::Result<Option<Order>>;

  /// Writes `next` if the stored row is still at `expected_version`.
  /// `next.version` is ignored; the store sets it to `expected_version + 1`.
  async fn compare_and_swap(&self, expected_version: i64, next: &Order) -> anyhow::Result<bool>;

  /// Orders still awaiting payment that already carry a provider reference
  /// and were created before `created_before`. Oldest first.
  async fn pending_payments(&self, created_before: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<Order>>;
}

pub type SharedOrderStore = Arc<dyn OrderStore>;
