use super::order::{Order, PaymentStatus};
use super::store::OrderStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe in-memory order store keyed by order number.
///
/// Same semantics as the Postgres store: unique order numbers and an atomic
/// version check. Used by tests and by the server when no database is
/// configured.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
  orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.orders.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.orders.read().is_empty()
  }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
  async fn insert(&self, order: &Order) -> anyhow::Result<bool> {
    let mut orders = self.orders.write();
    if orders.contains_key(&order.order_number) {
      return Ok(false);
    }
    orders.insert(order.order_number.clone(), order.clone());
    Ok(true)
  }

  async fn find_by_number(&self, order_number: &str) -> anyhow::Result<Option<Order>> {
    Ok(self.orders.read().get(order_number).cloned())
  }

  async fn compare_and_swap(&self, expected_version: i64, next: &Order) -> anyhow::Result<bool> {
    let mut orders = self.orders.write();
    match orders.get_mut(&next.order_number) {
      Some(stored) if stored.version == expected_version => {
        *stored = Order {
          version: expected_version + 1,
          ..next.clone()
        };
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn pending_payments(&self, created_before: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<Order>> {
    let orders = self.orders.read();
    let mut pending: Vec<Order> = orders
      .values()
      .filter(|o| o.payment_status == PaymentStatus::Pending)
      .filter(|o| o.transaction_id.is_some() && o.created_at < created_before)
      .filter(|o| !o.status.is_terminal())
      .cloned()
      .collect();
    pending.sort_by_key(|o| o.created_at);
    pending.truncate(limit.max(0) as usize);
    Ok(pending)
  }
}
