// settlement/src/ledger/service.rs

//! `OrderLedger`: the only writer of order and payment state.
//!
//! Every mutation is a read, a pure decision on the snapshot, and a
//! compare-and-swap on the order's version. A writer that loses the swap
//! reloads and decides again, so it lands on the winner's state and usually
//! short-circuits to the idempotent path.

use super::notify::SettlementNotifier;
use super::order::{generate_order_number, NewOrder, Order, OrderStatus, PaymentOutcome, PaymentStatus};
use super::store::SharedOrderStore;
use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Bound on reload-and-retry rounds after losing a version check.
pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 5;

const ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// What `apply_payment_outcome` did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
  /// The order changed.
  Transitioned,
  /// Duplicate success, or the order is already terminal. Nothing changed.
  AlreadyApplied,
  /// `PENDING` outcome. Nothing to record.
  Unchanged,
  /// A failure that lost to a recorded success, a newer observation, or a
  /// later payment attempt.
  StaleOutcome,
  /// No order carries this external reference.
  UnknownOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentApplication {
  pub applied: bool,
  pub order_id: Option<Uuid>,
  pub disposition: Disposition,
}

impl PaymentApplication {
  fn new(disposition: Disposition, order_id: Option<Uuid>) -> Self {
    let applied = matches!(disposition, Disposition::Transitioned | Disposition::AlreadyApplied);
    Self {
      applied,
      order_id,
      disposition,
    }
  }
}

enum Decision {
  AlreadyApplied,
  Stale,
  Unchanged,
  Write(Order),
}

/// Decides what a payment outcome does to `order`. Pure; no I/O.
fn decide_payment(
  order: &Order,
  provider_reference: &str,
  outcome: PaymentOutcome,
  observed_at: DateTime<Utc>,
  now: DateTime<Utc>,
) -> Decision {
  if order.status.is_terminal() {
    return Decision::AlreadyApplied;
  }

  match outcome {
    PaymentOutcome::Pending => Decision::Unchanged,
    PaymentOutcome::Successful => {
      if order.is_paid() {
        return Decision::AlreadyApplied;
      }
      let mut next = order.clone();
      next.payment_status = PaymentStatus::Paid;
      // A concurrent writer may already have moved fulfillment along.
      if next.status == OrderStatus::Pending {
        next.status = OrderStatus::Confirmed;
      }
      next.transaction_id = Some(provider_reference.to_string());
      next.last_outcome = Some(PaymentOutcome::Successful);
      next.outcome_observed_at = Some(observed_at);
      next.paid_at = Some(observed_at);
      next.updated_at = now;
      Decision::Write(next)
    }
    PaymentOutcome::Failed => {
      // Success is sticky.
      if order.is_paid() {
        return Decision::Stale;
      }
      if order.outcome_observed_at.is_some_and(|seen| observed_at < seen) {
        return Decision::Stale;
      }
      // Failures only count for the attempt currently on the order.
      if order
        .transaction_id
        .as_deref()
        .is_some_and(|current| current != provider_reference)
      {
        return Decision::Stale;
      }
      if order.payment_status == PaymentStatus::Failed && order.transaction_id.as_deref() == Some(provider_reference) {
        return Decision::AlreadyApplied;
      }
      let mut next = order.clone();
      next.payment_status = PaymentStatus::Failed;
      next.transaction_id = Some(provider_reference.to_string());
      next.last_outcome = Some(PaymentOutcome::Failed);
      next.outcome_observed_at = Some(observed_at);
      next.updated_at = now;
      Decision::Write(next)
    }
  }
}

pub struct OrderLedger {
  store: SharedOrderStore,
  notifier: Arc<dyn SettlementNotifier>,
  max_attempts: u32,
}

impl OrderLedger {
  pub fn new(store: SharedOrderStore, notifier: Arc<dyn SettlementNotifier>) -> Self {
    Self {
      store,
      notifier,
      max_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
    }
  }

  pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts.max(1);
    self
  }

  pub async fn find(&self, order_number: &str) -> LedgerResult<Option<Order>> {
    Ok(self.store.find_by_number(order_number).await?)
  }

  /// Creates an order in `PENDING/PENDING` at version 0.
  #[instrument(name = "OrderLedger::open_order", skip(self, new_order), fields(total_amount = new_order.total_amount))]
  pub async fn open_order(&self, new_order: NewOrder) -> LedgerResult<Order> {
    if new_order.total_amount <= 0 {
      return Err(LedgerError::InvalidOrder(format!(
        "total amount must be positive, got {}",
        new_order.total_amount
      )));
    }
    if new_order.delivery_fee < 0 || new_order.delivery_fee > new_order.total_amount {
      return Err(LedgerError::InvalidOrder(format!(
        "delivery fee {} must be within 0..={}",
        new_order.delivery_fee, new_order.total_amount
      )));
    }

    let now = Utc::now();
    let attempts = if new_order.order_number.is_some() { 1 } else { ORDER_NUMBER_ATTEMPTS };

    for _ in 0..attempts {
      let order_number = new_order
        .order_number
        .clone()
        .unwrap_or_else(|| generate_order_number(now));
      let order = Order {
        id: Uuid::new_v4(),
        order_number,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: new_order.payment_method,
        transaction_id: None,
        total_amount: new_order.total_amount,
        delivery_fee: new_order.delivery_fee,
        last_outcome: None,
        outcome_observed_at: None,
        paid_at: None,
        version: 0,
        created_at: now,
        updated_at: now,
      };

      if self.store.insert(&order).await? {
        info!(order_number = %order.order_number, order_id = %order.id, "Order opened.");
        return Ok(order);
      }
      warn!(order_number = %order.order_number, "Order number already taken.");
      if new_order.order_number.is_some() {
        return Err(LedgerError::DuplicateOrder {
          order_number: order.order_number,
        });
      }
    }

    Err(LedgerError::InvalidOrder(
      "could not allocate a unique order number".to_string(),
    ))
  }

  /// Applies a provider outcome for the order whose number is
  /// `external_reference`. Safe to call any number of times, from the webhook
  /// and the poller concurrently.
  #[instrument(
    name = "OrderLedger::apply_payment_outcome",
    skip(self),
    fields(attempt = tracing::field::Empty),
    err(Display)
  )]
  pub async fn apply_payment_outcome(
    &self,
    external_reference: &str,
    provider_reference: &str,
    outcome: PaymentOutcome,
    observed_at: DateTime<Utc>,
  ) -> LedgerResult<PaymentApplication> {
    for attempt in 1..=self.max_attempts {
      tracing::Span::current().record("attempt", attempt);

      let Some(order) = self.store.find_by_number(external_reference).await? else {
        self.notifier.unknown_order(external_reference, provider_reference).await;
        return Ok(PaymentApplication::new(Disposition::UnknownOrder, None));
      };

      let next = match decide_payment(&order, provider_reference, outcome, observed_at, Utc::now()) {
        Decision::AlreadyApplied => {
          debug!(status = %order.status, payment_status = %order.payment_status, "Outcome already applied.");
          return Ok(PaymentApplication::new(Disposition::AlreadyApplied, Some(order.id)));
        }
        Decision::Stale => {
          info!(
            payment_status = %order.payment_status,
            recorded_observed_at = ?order.outcome_observed_at,
            "Discarding stale payment outcome."
          );
          return Ok(PaymentApplication::new(Disposition::StaleOutcome, Some(order.id)));
        }
        Decision::Unchanged => {
          return Ok(PaymentApplication::new(Disposition::Unchanged, Some(order.id)));
        }
        Decision::Write(next) => next,
      };

      if !self.store.compare_and_swap(order.version, &next).await? {
        debug!(version = order.version, "Lost version check, reloading order.");
        continue;
      }

      info!(
        order_id = %order.id,
        status = %next.status,
        payment_status = %next.payment_status,
        "Payment outcome applied."
      );

      if next.is_paid() && !order.is_paid() {
        let committed = Order {
          version: order.version + 1,
          ..next
        };
        if let Err(e) = self.notifier.payment_confirmed(&committed).await {
          warn!(error = %e, "Payment confirmation side effect failed.");
        }
      }
      return Ok(PaymentApplication::new(Disposition::Transitioned, Some(order.id)));
    }

    Err(LedgerError::ConflictRetryExhausted {
      order_number: external_reference.to_string(),
      attempts: self.max_attempts,
    })
  }

  /// Records the provider reference of a newly initiated collection. A new
  /// attempt on a `FAILED` order puts its payment back to `PENDING`.
  #[instrument(name = "OrderLedger::attach_provider_reference", skip(self), err(Display))]
  pub async fn attach_provider_reference(&self, order_number: &str, provider_reference: &str) -> LedgerResult<Order> {
    self
      .mutate(order_number, |order| {
        if order.transaction_id.as_deref() == Some(provider_reference) {
          return Ok(None);
        }
        if order.is_paid() || order.status.is_terminal() {
          return Err(LedgerError::InvalidTransition {
            order_number: order.order_number.clone(),
            from: order.status,
            payment: order.payment_status,
            to: order.status,
          });
        }
        let mut next = order.clone();
        next.transaction_id = Some(provider_reference.to_string());
        next.payment_status = PaymentStatus::Pending;
        Ok(Some(next))
      })
      .await
  }

  /// Moves fulfillment forward. Only `PROCESSING`, `SHIPPED` and `DELIVERED`
  /// are valid targets, and only from a confirmed (paid) order.
  #[instrument(name = "OrderLedger::advance_fulfillment", skip(self), err(Display))]
  pub async fn advance_fulfillment(&self, order_number: &str, target: OrderStatus) -> LedgerResult<Order> {
    self
      .mutate(order_number, |order| {
        let invalid = || LedgerError::InvalidTransition {
          order_number: order.order_number.clone(),
          from: order.status,
          payment: order.payment_status,
          to: target,
        };
        if !matches!(
          target,
          OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        ) || matches!(order.status, OrderStatus::Pending | OrderStatus::Cancelled)
        {
          return Err(invalid());
        }
        let (Some(current), Some(wanted)) = (order.status.rank(), target.rank()) else {
          return Err(invalid());
        };
        if wanted == current {
          return Ok(None);
        }
        if wanted < current {
          return Err(invalid());
        }
        let mut next = order.clone();
        next.status = target;
        Ok(Some(next))
      })
      .await
  }

  /// Cancels an unpaid order. Cancelling twice is a no-op.
  #[instrument(name = "OrderLedger::cancel", skip(self), err(Display))]
  pub async fn cancel(&self, order_number: &str) -> LedgerResult<Order> {
    self
      .mutate(order_number, |order| {
        if order.status == OrderStatus::Cancelled {
          return Ok(None);
        }
        if order.is_paid() || order.status.is_terminal() {
          return Err(LedgerError::InvalidTransition {
            order_number: order.order_number.clone(),
            from: order.status,
            payment: order.payment_status,
            to: OrderStatus::Cancelled,
          });
        }
        let mut next = order.clone();
        next.status = OrderStatus::Cancelled;
        Ok(Some(next))
      })
      .await
  }

  /// Read, decide, swap; retried on version conflicts. `decide` returning
  /// `Ok(None)` means nothing to write and yields the current order.
  async fn mutate<F>(&self, order_number: &str, decide: F) -> LedgerResult<Order>
  where
    F: Fn(&Order) -> LedgerResult<Option<Order>>,
  {
    for _ in 0..self.max_attempts {
      let order = self
        .store
        .find_by_number(order_number)
        .await?
        .ok_or_else(|| LedgerError::UnknownOrder {
          order_number: order_number.to_string(),
        })?;

      let Some(mut next) = decide(&order)? else {
        return Ok(order);
      };
      next.updated_at = Utc::now();

      if self.store.compare_and_swap(order.version, &next).await? {
        next.version = order.version + 1;
        info!(order_number, status = %next.status, payment_status = %next.payment_status, "Order updated.");
        return Ok(next);
      }
      debug!(order_number, version = order.version, "Lost version check, reloading order.");
    }

    Err(LedgerError::ConflictRetryExhausted {
      order_number: order_number.to_string(),
      attempts: self.max_attempts,
    })
  }
}
