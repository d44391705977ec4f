// tests/common/mod.rs
#![allow(dead_code)] // Not every test binary uses every helper.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use settlement::error::GatewayResult;
use settlement::gateway::{Collection, CollectionRequest, PaymentGateway, StatusReport};
use settlement::ledger::{InMemoryOrderStore, NewOrder, Order, OrderLedger, OrderStore, PaymentMethod, PaymentOutcome, SettlementNotifier};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

// --- Tracing Setup (once per test binary) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Notifier that counts side effects ---
#[derive(Default)]
pub struct RecordingNotifier {
  pub confirmations: AtomicUsize,
  pub unknown_orders: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
  pub fn confirmations(&self) -> usize {
    self.confirmations.load(Ordering::SeqCst)
  }

  pub fn alerts(&self) -> Vec<(String, String)> {
    self.unknown_orders.lock().clone()
  }
}

#[async_trait]
impl SettlementNotifier for RecordingNotifier {
  async fn payment_confirmed(&self, _order: &Order) -> anyhow::Result<()> {
    self.confirmations.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn unknown_order(&self, external_reference: &str, provider_reference: &str) {
    self
      .unknown_orders
      .lock()
      .push((external_reference.to_string(), provider_reference.to_string()));
  }
}

// --- Store that widens the read-modify-write window ---

/// Sleeps after every read so concurrent writers reliably load the same
/// version before either of them swaps.
#[derive(Clone)]
pub struct RacyStore {
  pub inner: InMemoryOrderStore,
  pub read_delay: Duration,
  pub cas_failures: Arc<AtomicUsize>,
}

impl RacyStore {
  pub fn new(read_delay: Duration) -> Self {
    Self {
      inner: InMemoryOrderStore::new(),
      read_delay,
      cas_failures: Arc::new(AtomicUsize::new(0)),
    }
  }
}

#[async_trait]
impl OrderStore for RacyStore {
  async fn insert(&self, order: &Order) -> anyhow::Result<bool> {
    self.inner.insert(order).await
  }

  async fn find_by_number(&self, order_number: &str) -> anyhow::Result<Option<Order>> {
    let found = self.inner.find_by_number(order_number).await?;
    tokio::time::sleep(self.read_delay).await;
    Ok(found)
  }

  async fn compare_and_swap(&self, expected_version: i64, next: &Order) -> anyhow::Result<bool> {
    let swapped = self.inner.compare_and_swap(expected_version, next).await?;
    if !swapped {
      self.cas_failures.fetch_add(1, Ordering::SeqCst);
    }
    Ok(swapped)
  }

  async fn pending_payments(&self, created_before: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<Order>> {
    self.inner.pending_payments(created_before, limit).await
  }
}

/// Store whose version check never succeeds.
#[derive(Clone, Default)]
pub struct AlwaysConflictingStore {
  pub inner: InMemoryOrderStore,
}

#[async_trait]
impl OrderStore for AlwaysConflictingStore {
  async fn insert(&self, order: &Order) -> anyhow::Result<bool> {
    self.inner.insert(order).await
  }

  async fn find_by_number(&self, order_number: &str) -> anyhow::Result<Option<Order>> {
    self.inner.find_by_number(order_number).await
  }

  async fn compare_and_swap(&self, _expected_version: i64, _next: &Order) -> anyhow::Result<bool> {
    Ok(false)
  }

  async fn pending_payments(&self, created_before: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<Order>> {
    self.inner.pending_payments(created_before, limit).await
  }
}

/// Store that is down.
pub struct UnavailableStore;

#[async_trait]
impl OrderStore for UnavailableStore {
  async fn insert(&self, _order: &Order) -> anyhow::Result<bool> {
    anyhow::bail!("connection refused")
  }

  async fn find_by_number(&self, _order_number: &str) -> anyhow::Result<Option<Order>> {
    anyhow::bail!("connection refused")
  }

  async fn compare_and_swap(&self, _expected_version: i64, _next: &Order) -> anyhow::Result<bool> {
    anyhow::bail!("connection refused")
  }

  async fn pending_payments(&self, _created_before: DateTime<Utc>, _limit: i64) -> anyhow::Result<Vec<Order>> {
    anyhow::bail!("connection refused")
  }
}

// --- Scripted gateway for poller tests ---

/// Answers `check_status` from a script; the last entry repeats.
pub struct ScriptedGateway {
  script: Mutex<VecDeque<GatewayResult<PaymentOutcome>>>,
  pub status_calls: AtomicUsize,
}

impl ScriptedGateway {
  pub fn new(script: Vec<GatewayResult<PaymentOutcome>>) -> Self {
    Self {
      script: Mutex::new(script.into()),
      status_calls: AtomicUsize::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.status_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
  async fn initiate_payment(&self, request: &CollectionRequest) -> GatewayResult<Collection> {
    Ok(Collection {
      provider_reference: format!("ref-{}", request.external_reference),
      ussd_prompt: Some("*126#".to_string()),
    })
  }

  async fn check_status(&self, _provider_reference: &str) -> GatewayResult<StatusReport> {
    self.status_calls.fetch_add(1, Ordering::SeqCst);
    let mut script = self.script.lock();
    let next = if script.len() > 1 {
      script.pop_front()
    } else {
      script.front().cloned()
    };
    next
      .unwrap_or(Ok(PaymentOutcome::Pending))
      .map(|outcome| StatusReport { outcome, message: None })
  }
}

// --- Ledger helpers ---

pub fn ledger_with<S: OrderStore + 'static>(store: S, notifier: Arc<RecordingNotifier>) -> Arc<OrderLedger> {
  Arc::new(OrderLedger::new(Arc::new(store), notifier))
}

pub async fn open_order(ledger: &OrderLedger, order_number: &str) -> Order {
  ledger
    .open_order(NewOrder {
      order_number: Some(order_number.to_string()),
      payment_method: PaymentMethod::MobileMoney,
      total_amount: 12_000,
      delivery_fee: 2_000,
    })
    .await
    .expect("order opens")
}

/// Opens an order and records a provider reference on it, as checkout does.
pub async fn open_initiated_order(ledger: &OrderLedger, order_number: &str, provider_reference: &str) -> Order {
  open_order(ledger, order_number).await;
  ledger
    .attach_provider_reference(order_number, provider_reference)
    .await
    .expect("reference attaches")
}
