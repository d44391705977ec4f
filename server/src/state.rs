// settlement/server/src/state.rs
use crate::config::AppConfig;
use settlement::gateway::PaymentGateway;
use settlement::ledger::{OrderLedger, SettlementNotifier, SharedOrderStore};
use settlement::reconcile::{PaymentPoller, ReconciliationHandler, SignatureVerifier};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub ledger: Arc<OrderLedger>,
  pub reconciler: Arc<ReconciliationHandler>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub poller: Arc<PaymentPoller>,
  pub config: Arc<AppConfig>, // Share loaded config
}

impl AppState {
  /// Wires the settlement components around one store and one gateway. The
  /// ledger is shared, so the webhook path and the poller write through the
  /// same authority.
  pub fn new(
    config: Arc<AppConfig>,
    store: SharedOrderStore,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn SettlementNotifier>,
    verifier: Arc<dyn SignatureVerifier>,
  ) -> Self {
    let ledger = Arc::new(OrderLedger::new(store.clone(), notifier));
    let reconciler = Arc::new(ReconciliationHandler::new(ledger.clone(), verifier));
    let poller = Arc::new(PaymentPoller::new(
      gateway.clone(),
      ledger.clone(),
      store,
      config.poll_policy(),
    ));
    Self {
      ledger,
      reconciler,
      gateway,
      poller,
      config,
    }
  }
}
