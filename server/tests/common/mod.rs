// settlement/server/tests/common/mod.rs
#![allow(dead_code)] // Not every test binary uses every helper.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use settlement::error::{GatewayError, GatewayResult};
use settlement::gateway::{Collection, CollectionRequest, PaymentGateway, StatusReport};
use settlement::ledger::{InMemoryOrderStore, Order, OrderStore, PaymentOutcome, SettlementNotifier, SharedOrderStore};
use settlement::reconcile::UnverifiedSignatures;
use settlement_server::{AppConfig, AppState};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
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

// --- Gateway double ---

/// Accepts every collection with a fresh reference, or fails them all when
/// `failing` is set. Status checks always answer pending so the background
/// poller never races the assertions.
#[derive(Default)]
pub struct FakeGateway {
  pub failing: AtomicBool,
  pub requests: Mutex<Vec<CollectionRequest>>,
  issued: AtomicUsize,
}

impl FakeGateway {
  pub fn failing() -> Self {
    let gateway = Self::default();
    gateway.failing.store(true, Ordering::SeqCst);
    gateway
  }

  pub fn requests(&self) -> Vec<CollectionRequest> {
    self.requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
  async fn initiate_payment(&self, request: &CollectionRequest) -> GatewayResult<Collection> {
    self.requests.lock().unwrap().push(request.clone());
    if self.failing.load(Ordering::SeqCst) {
      return Err(GatewayError::Unavailable(
        "POST collect/ timed out after 15s (upstream 10.0.3.7)".to_string(),
      ));
    }
    let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Collection {
      provider_reference: format!("cp-{n}-{}", request.external_reference),
      ussd_prompt: Some("*126#".to_string()),
    })
  }

  async fn check_status(&self, _provider_reference: &str) -> GatewayResult<StatusReport> {
    Ok(StatusReport {
      outcome: PaymentOutcome::Pending,
      message: None,
    })
  }
}

// --- Notifier that counts side effects ---

#[derive(Default)]
pub struct RecordingNotifier {
  pub confirmations: AtomicUsize,
  pub unknown_orders: Mutex<Vec<String>>,
}

impl RecordingNotifier {
  pub fn confirmations(&self) -> usize {
    self.confirmations.load(Ordering::SeqCst)
  }

  pub fn alerts(&self) -> Vec<String> {
    self.unknown_orders.lock().unwrap().clone()
  }
}

#[async_trait]
impl SettlementNotifier for RecordingNotifier {
  async fn payment_confirmed(&self, _order: &Order) -> anyhow::Result<()> {
    self.confirmations.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn unknown_order(&self, external_reference: &str, _provider_reference: &str) {
    self.unknown_orders.lock().unwrap().push(external_reference.to_string());
  }
}

/// Store that is down.
pub struct UnavailableStore;

#[async_trait]
impl OrderStore for UnavailableStore {
  async fn insert(&self, _order: &Order) -> anyhow::Result<bool> {
    anyhow::bail!("pool timed out while waiting for an open connection")
  }

  async fn find_by_number(&self, _order_number: &str) -> anyhow::Result<Option<Order>> {
    anyhow::bail!("pool timed out while waiting for an open connection")
  }

  async fn compare_and_swap(&self, _expected_version: i64, _next: &Order) -> anyhow::Result<bool> {
    anyhow::bail!("pool timed out while waiting for an open connection")
  }

  async fn pending_payments(&self, _created_before: DateTime<Utc>, _limit: i64) -> anyhow::Result<Vec<Order>> {
    anyhow::bail!("pool timed out while waiting for an open connection")
  }
}

pub struct TestContext {
  pub state: AppState,
  pub gateway: Arc<FakeGateway>,
  pub notifier: Arc<RecordingNotifier>,
}

pub fn context_with(store: SharedOrderStore, gateway: FakeGateway) -> TestContext {
  let gateway = Arc::new(gateway);
  let notifier = Arc::new(RecordingNotifier::default());
  let state = AppState::new(
    Arc::new(AppConfig::for_local("http://127.0.0.1:9/api")),
    store,
    gateway.clone(),
    notifier.clone(),
    Arc::new(UnverifiedSignatures),
  );
  TestContext {
    state,
    gateway,
    notifier,
  }
}

pub fn in_memory_context() -> TestContext {
  context_with(Arc::new(InMemoryOrderStore::new()), FakeGateway::default())
}
