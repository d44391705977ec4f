// tests/reconcile_tests.rs
mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use serial_test::serial;
use settlement::error::{GatewayError, ReconcileError};
use settlement::ledger::{Disposition, InMemoryOrderStore, OrderStatus, PaymentOutcome, PaymentStatus};
use settlement::reconcile::{
  PaymentPoller, PollPolicy, PollResult, ReconciliationHandler, SignatureVerifier, SweepReport, UnverifiedSignatures,
};
use std::sync::Arc;
use std::time::Duration;

struct RejectAll;

impl SignatureVerifier for RejectAll {
  fn verify(&self, _payload: &[u8], _signature: Option<&str>) -> Result<(), ReconcileError> {
    Err(ReconcileError::SignatureRejected("bad signature".to_string()))
  }
}

fn fast_policy(max_attempts: u32) -> PollPolicy {
  PollPolicy {
    interval: Duration::from_millis(1),
    max_attempts,
  }
}

#[tokio::test]
#[serial]
async fn webhook_success_confirms_order() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let ledger = ledger_with(InMemoryOrderStore::new(), notifier.clone());
  let order = open_initiated_order(&ledger, "INV-2024-0247", "cp-1").await;
  let handler = ReconciliationHandler::new(ledger.clone(), Arc::new(UnverifiedSignatures));

  let body = br#"{"reference":"cp-1","status":"SUCCESSFUL","external_reference":"INV-2024-0247","amount":"12000"}"#;
  let ack = handler.handle(body, Some("sig")).await.unwrap();

  assert!(ack.received);
  assert_eq!(ack.updated, Some(order.id));
  assert_eq!(ack.disposition, Some(Disposition::Transitioned));
  let order = ledger.find("INV-2024-0247").await.unwrap().unwrap();
  assert_eq!(order.status, OrderStatus::Confirmed);
  assert_eq!(order.payment_status, PaymentStatus::Paid);

  // Redelivery is acknowledged the same way and changes nothing.
  let again = handler.handle(body, Some("sig")).await.unwrap();
  assert_eq!(again.updated, Some(order.id));
  assert_eq!(again.disposition, Some(Disposition::AlreadyApplied));
  assert_eq!(notifier.confirmations(), 1);
}

#[tokio::test]
#[serial]
async fn webhook_for_unknown_order_is_acknowledged_and_alerted() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let store = InMemoryOrderStore::new();
  let ledger = ledger_with(store.clone(), notifier.clone());
  let handler = ReconciliationHandler::new(ledger, Arc::new(UnverifiedSignatures));

  let ack = handler
    .handle(br#"{"reference":"cp-77","status":"SUCCESSFUL","external_reference":"INV-0000-GONE"}"#, None)
    .await
    .unwrap();

  assert!(ack.received);
  assert_eq!(ack.updated, None);
  assert_eq!(ack.disposition, Some(Disposition::UnknownOrder));
  assert_eq!(notifier.alerts(), vec![("INV-0000-GONE".to_string(), "cp-77".to_string())]);
  assert!(store.is_empty());
}

#[tokio::test]
#[serial]
async fn malformed_webhooks_touch_nothing() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let ledger = ledger_with(InMemoryOrderStore::new(), notifier.clone());
  let before = open_initiated_order(&ledger, "INV-2024-0500", "cp-5").await;
  let handler = ReconciliationHandler::new(ledger.clone(), Arc::new(UnverifiedSignatures));

  for body in [
    &br#"{"status":"SUCCESSFUL","external_reference":"INV-2024-0500"}"#[..],
    &br#"{"reference":"cp-5","status":"SUCCESSFUL"}"#[..],
    &b"{"[..],
  ] {
    let err = handler.handle(body, None).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Malformed(_)));
    assert!(!err.is_transient());
  }

  assert_eq!(ledger.find("INV-2024-0500").await.unwrap().unwrap(), before);
  assert!(notifier.alerts().is_empty());
}

#[tokio::test]
#[serial]
async fn unrecognized_status_leaves_order_pending() {
  setup_tracing();
  let ledger = ledger_with(InMemoryOrderStore::new(), Arc::new(RecordingNotifier::default()));
  let before = open_initiated_order(&ledger, "INV-2024-0510", "cp-51").await;
  let handler = ReconciliationHandler::new(ledger.clone(), Arc::new(UnverifiedSignatures));

  let ack = handler
    .handle(br#"{"reference":"cp-51","status":"REVERSED","external_reference":"INV-2024-0510"}"#, None)
    .await
    .unwrap();

  assert!(ack.received);
  assert_eq!(ack.disposition, Some(Disposition::Unchanged));
  assert_eq!(ledger.find("INV-2024-0510").await.unwrap().unwrap(), before);
}

#[tokio::test]
#[serial]
async fn rejected_signature_stops_before_parsing() {
  setup_tracing();
  let ledger = ledger_with(InMemoryOrderStore::new(), Arc::new(RecordingNotifier::default()));
  let before = open_initiated_order(&ledger, "INV-2024-0520", "cp-52").await;
  let handler = ReconciliationHandler::new(ledger.clone(), Arc::new(RejectAll));

  let err = handler
    .handle(br#"{"reference":"cp-52","status":"SUCCESSFUL","external_reference":"INV-2024-0520"}"#, Some("forged"))
    .await
    .unwrap_err();

  assert!(matches!(err, ReconcileError::SignatureRejected(_)));
  assert_eq!(ledger.find("INV-2024-0520").await.unwrap().unwrap(), before);
}

#[tokio::test]
#[serial]
async fn store_outage_asks_for_redelivery() {
  setup_tracing();
  let ledger = ledger_with(UnavailableStore, Arc::new(RecordingNotifier::default()));
  let handler = ReconciliationHandler::new(ledger, Arc::new(UnverifiedSignatures));

  let err = handler
    .handle(br#"{"reference":"cp-1","status":"SUCCESSFUL","external_reference":"INV-2024-0530"}"#, None)
    .await
    .unwrap_err();
  assert!(err.is_transient());
}

#[tokio::test]
#[serial]
async fn poller_settles_once_the_provider_knows() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let store = InMemoryOrderStore::new();
  let ledger = ledger_with(store.clone(), notifier.clone());
  open_initiated_order(&ledger, "INV-2024-0600", "cp-6").await;

  let gateway = Arc::new(ScriptedGateway::new(vec![
    Ok(PaymentOutcome::Pending),
    Err(GatewayError::Unavailable("timeout".to_string())),
    Ok(PaymentOutcome::Successful),
  ]));
  let poller = PaymentPoller::new(gateway.clone(), ledger.clone(), Arc::new(store), fast_policy(10));

  let result = poller.poll_until_settled("INV-2024-0600", "cp-6").await.unwrap();

  let PollResult::Settled(application) = result else {
    panic!("expected settlement, got {result:?}");
  };
  assert_eq!(application.disposition, Disposition::Transitioned);
  assert_eq!(gateway.calls(), 3);
  assert_eq!(notifier.confirmations(), 1);
  assert!(ledger.find("INV-2024-0600").await.unwrap().unwrap().is_paid());
}

#[tokio::test]
#[serial]
async fn poller_gives_up_and_leaves_order_pending() {
  setup_tracing();
  let store = InMemoryOrderStore::new();
  let ledger = ledger_with(store.clone(), Arc::new(RecordingNotifier::default()));
  let before = open_initiated_order(&ledger, "INV-2024-0610", "cp-61").await;

  let gateway = Arc::new(ScriptedGateway::new(vec![Err(GatewayError::Unavailable(
    "provider down".to_string(),
  ))]));
  let poller = PaymentPoller::new(gateway.clone(), ledger.clone(), Arc::new(store), fast_policy(4));

  let result = poller.poll_until_settled("INV-2024-0610", "cp-61").await.unwrap();

  assert_eq!(result, PollResult::Exhausted { attempts: 4 });
  assert_eq!(gateway.calls(), 4);
  assert_eq!(ledger.find("INV-2024-0610").await.unwrap().unwrap(), before);
}

#[tokio::test]
#[serial]
async fn poller_failure_marks_payment_failed() {
  setup_tracing();
  let store = InMemoryOrderStore::new();
  let ledger = ledger_with(store.clone(), Arc::new(RecordingNotifier::default()));
  open_initiated_order(&ledger, "INV-2024-0620", "cp-62").await;

  let gateway = Arc::new(ScriptedGateway::new(vec![Ok(PaymentOutcome::Failed)]));
  let poller = PaymentPoller::new(gateway, ledger.clone(), Arc::new(store), fast_policy(3));

  poller.poll_until_settled("INV-2024-0620", "cp-62").await.unwrap();

  let order = ledger.find("INV-2024-0620").await.unwrap().unwrap();
  assert_eq!(order.payment_status, PaymentStatus::Failed);
  assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
#[serial]
async fn poller_for_replaced_attempt_steps_aside() {
  setup_tracing();
  let store = InMemoryOrderStore::new();
  let ledger = ledger_with(store.clone(), Arc::new(RecordingNotifier::default()));
  open_initiated_order(&ledger, "INV-2024-0630", "cp-63a").await;
  ledger
    .apply_payment_outcome("INV-2024-0630", "cp-63a", PaymentOutcome::Failed, Utc::now())
    .await
    .unwrap();
  let retried = ledger.attach_provider_reference("INV-2024-0630", "cp-63b").await.unwrap();

  // The provider would still report the first attempt as failed.
  let gateway = Arc::new(ScriptedGateway::new(vec![Ok(PaymentOutcome::Failed)]));
  let poller = PaymentPoller::new(gateway.clone(), ledger.clone(), Arc::new(store), fast_policy(5));

  let result = poller.poll_until_settled("INV-2024-0630", "cp-63a").await.unwrap();

  assert_eq!(result, PollResult::Resolved { checks: 0 });
  assert_eq!(gateway.calls(), 0);
  let order = ledger.find("INV-2024-0630").await.unwrap().unwrap();
  assert_eq!(order, retried);
  assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
#[serial]
async fn poller_stops_once_order_is_paid_elsewhere() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let store = InMemoryOrderStore::new();
  let ledger = ledger_with(store.clone(), notifier.clone());
  open_initiated_order(&ledger, "INV-2024-0640", "cp-64").await;

  // Pending once; the webhook lands before the next check.
  let gateway = Arc::new(ScriptedGateway::new(vec![Ok(PaymentOutcome::Pending)]));
  let poller = PaymentPoller::new(
    gateway.clone(),
    ledger.clone(),
    Arc::new(store),
    PollPolicy {
      interval: Duration::from_millis(50),
      max_attempts: 5,
    },
  );
  let webhook = async {
    tokio::time::sleep(Duration::from_millis(10)).await;
    ledger
      .apply_payment_outcome("INV-2024-0640", "cp-64", PaymentOutcome::Successful, Utc::now())
      .await
      .unwrap()
  };

  let (polled, applied) = tokio::join!(poller.poll_until_settled("INV-2024-0640", "cp-64"), webhook);

  assert_eq!(applied.disposition, Disposition::Transitioned);
  assert_eq!(polled.unwrap(), PollResult::Resolved { checks: 1 });
  assert_eq!(gateway.calls(), 1);
  assert_eq!(notifier.confirmations(), 1);
}

#[tokio::test]
#[serial]
async fn sweep_checks_only_old_pending_payments() {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let store = InMemoryOrderStore::new();
  let ledger = ledger_with(store.clone(), notifier.clone());
  open_initiated_order(&ledger, "INV-2024-0700", "cp-70").await;
  open_initiated_order(&ledger, "INV-2024-0701", "cp-71").await;
  // No reference yet: nothing to ask the provider about.
  open_order(&ledger, "INV-2024-0702").await;

  let gateway = Arc::new(ScriptedGateway::new(vec![Ok(PaymentOutcome::Successful)]));
  let poller = PaymentPoller::new(gateway.clone(), ledger.clone(), Arc::new(store), fast_policy(1));

  // Orders were created just now, so a ten minute threshold skips them all.
  let none = poller.sweep_pending(Duration::from_secs(600), 50).await.unwrap();
  assert_eq!(none, SweepReport::default());
  assert_eq!(gateway.calls(), 0);

  tokio::time::sleep(Duration::from_millis(5)).await;
  let report = poller.sweep_pending(Duration::ZERO, 50).await.unwrap();
  assert_eq!(
    report,
    SweepReport {
      checked: 2,
      settled: 2,
      still_pending: 0
    }
  );
  assert_eq!(notifier.confirmations(), 2);
  assert!(ledger.find("INV-2024-0702").await.unwrap().unwrap().payment_status == PaymentStatus::Pending);

  // Paid orders drop out of the next sweep.
  let after = poller.sweep_pending(Duration::ZERO, 50).await.unwrap();
  assert_eq!(after.checked, 0);
}

#[tokio::test]
#[serial]
async fn handler_apply_respects_observation_time() {
  setup_tracing();
  let ledger = ledger_with(InMemoryOrderStore::new(), Arc::new(RecordingNotifier::default()));
  open_initiated_order(&ledger, "INV-2024-0800", "cp-8").await;
  let handler = ReconciliationHandler::new(ledger.clone(), Arc::new(UnverifiedSignatures));

  let now = Utc::now();
  let fresh = settlement::reconcile::parse_notification(
    br#"{"reference":"cp-8","status":"FAILED","external_reference":"INV-2024-0800"}"#,
  )
  .unwrap();
  handler.apply(fresh.clone(), now).await.unwrap();

  // The same failure observed earlier arrives late.
  let late = handler.apply(fresh, now - ChronoDuration::seconds(30)).await.unwrap();
  assert_eq!(late.disposition, Some(Disposition::StaleOutcome));
}
