// settlement/server/src/services/receipt_mock.rs
use async_trait::async_trait;
use settlement::ledger::{LogNotifier, Order, SettlementNotifier};
use tracing::info;

/// Stands in for the customer/vendor receipt channel (SMS or email) until a
/// real provider is wired. Unknown-order alerts go to the log.
#[derive(Debug, Default, Clone)]
pub struct MockReceiptNotifier {
  alerts: LogNotifier,
}

#[async_trait]
impl SettlementNotifier for MockReceiptNotifier {
  async fn payment_confirmed(&self, order: &Order) -> anyhow::Result<()> {
    info!(
      "Simulating payment receipt: Order='{}', Amount={} XAF, Reference='{}'",
      order.order_number,
      order.total_amount,
      order.transaction_id.as_deref().unwrap_or("-")
    );
    tokio::time::sleep(std::time::Duration::from_millis(20)).await; // Simulate network latency

    let message_id = format!("mock_receipt_{}", uuid::Uuid::new_v4());
    info!("Mock receipt sent successfully. Message ID: {}", message_id);
    Ok(())
  }

  async fn unknown_order(&self, external_reference: &str, provider_reference: &str) {
    self.alerts.unknown_order(external_reference, provider_reference).await;
  }
}
