// settlement/src/reconcile/poller.rs

//! Fallback driver for when no webhook arrives: ask the gateway, feed the
//! answer to the ledger. Bounded; running out of attempts leaves the order
//! pending for an operator instead of guessing.

use crate::error::LedgerResult;
use crate::gateway::PaymentGateway;
use crate::ledger::{OrderLedger, PaymentApplication, PaymentOutcome, SharedOrderStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
  pub interval: Duration,
  pub max_attempts: u32,
}

impl Default for PollPolicy {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(30),
      max_attempts: 10,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
  /// A final outcome reached the ledger.
  Settled(PaymentApplication),
  /// Still pending after every attempt.
  Exhausted { attempts: u32 },
  /// The order got paid, closed, or moved to another attempt while polling.
  Resolved { checks: u32 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
  pub checked: usize,
  pub settled: usize,
  pub still_pending: usize,
}

pub struct PaymentPoller {
  gateway: Arc<dyn PaymentGateway>,
  ledger: Arc<OrderLedger>,
  store: SharedOrderStore,
  policy: PollPolicy,
}

impl PaymentPoller {
  pub fn new(
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<OrderLedger>,
    store: SharedOrderStore,
    policy: PollPolicy,
  ) -> Self {
    Self {
      gateway,
      ledger,
      store,
      policy,
    }
  }

  /// One status check. Gateway errors count as pending.
  async fn check_once(&self, provider_reference: &str) -> PaymentOutcome {
    match self.gateway.check_status(provider_reference).await {
      Ok(report) => report.outcome,
      Err(e) => {
        warn!(error = %e, provider_reference, "Could not verify payment status; treating as pending.");
        PaymentOutcome::Pending
      }
    }
  }

  /// True while the order is open, unpaid and still on `provider_reference`.
  async fn awaits_reference(&self, order_number: &str, provider_reference: &str) -> LedgerResult<bool> {
    Ok(self.ledger.find(order_number).await?.is_some_and(|order| {
      !order.is_paid()
        && !order.status.is_terminal()
        && order.transaction_id.as_deref() == Some(provider_reference)
    }))
  }

  /// Polls until a final outcome is applied or the attempts run out. Stops
  /// early once something else settles the order or a retry replaces the
  /// reference.
  #[instrument(name = "PaymentPoller::poll_until_settled", skip(self), err(Display))]
  pub async fn poll_until_settled(&self, order_number: &str, provider_reference: &str) -> LedgerResult<PollResult> {
    for attempt in 1..=self.policy.max_attempts {
      if !self.awaits_reference(order_number, provider_reference).await? {
        info!(checks = attempt - 1, "Order no longer waits on this reference; polling stopped.");
        return Ok(PollResult::Resolved { checks: attempt - 1 });
      }
      let outcome = self.check_once(provider_reference).await;
      if outcome != PaymentOutcome::Pending {
        let application = self
          .ledger
          .apply_payment_outcome(order_number, provider_reference, outcome, Utc::now())
          .await?;
        info!(attempt, %outcome, ?application.disposition, "Payment settled by polling.");
        return Ok(PollResult::Settled(application));
      }
      if attempt < self.policy.max_attempts {
        tokio::time::sleep(self.policy.interval).await;
      }
    }

    warn!(
      attempts = self.policy.max_attempts,
      "Payment still pending after polling; leaving for operator follow-up."
    );
    Ok(PollResult::Exhausted {
      attempts: self.policy.max_attempts,
    })
  }

  /// Checks every pending payment older than `older_than` once.
  #[instrument(name = "PaymentPoller::sweep_pending", skip(self), err(Display))]
  pub async fn sweep_pending(&self, older_than: Duration, limit: i64) -> LedgerResult<SweepReport> {
    let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
    let pending = self.store.pending_payments(cutoff, limit).await?;
    let mut report = SweepReport::default();

    for order in pending {
      let Some(reference) = order.transaction_id.as_deref() else {
        continue;
      };
      report.checked += 1;
      let outcome = self.check_once(reference).await;
      if outcome == PaymentOutcome::Pending {
        report.still_pending += 1;
        continue;
      }
      match self
        .ledger
        .apply_payment_outcome(&order.order_number, reference, outcome, Utc::now())
        .await
      {
        Ok(_) => report.settled += 1,
        // One bad order must not stall the sweep.
        Err(e) => warn!(order_number = %order.order_number, error = %e, "Sweep could not apply outcome."),
      }
    }

    if report.checked > 0 {
      info!(checked = report.checked, settled = report.settled, still_pending = report.still_pending, "Pending payment sweep finished.");
    }
    Ok(report)
  }
}
