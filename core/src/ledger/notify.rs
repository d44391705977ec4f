use super::order::Order;
use async_trait::async_trait;
use tracing::{error, info};

/// Side effects of settlement. Called after the state change committed.
///
/// `payment_confirmed` fires at most once per order: only the writer whose
/// compare-and-swap moved the order to `PAID` calls it.
#[async_trait]
pub trait SettlementNotifier: Send + Sync {
  async fn payment_confirmed(&self, order: &Order) -> anyhow::Result<()>;

  /// A notification referenced an order that does not exist. Points at a
  /// correlation bug or a forged delivery.
  async fn unknown_order(&self, external_reference: &str, provider_reference: &str);
}

/// Writes both events to the log. The unknown-order alert is logged at error
/// level with `alert = "unknown_order"` so log-based alerting can pick it up.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl SettlementNotifier for LogNotifier {
  async fn payment_confirmed(&self, order: &Order) -> anyhow::Result<()> {
    info!(
      order_number = %order.order_number,
      transaction_id = ?order.transaction_id,
      total_amount = order.total_amount,
      "Payment confirmed; customer and vendor notifications queued."
    );
    Ok(())
  }

  async fn unknown_order(&self, external_reference: &str, provider_reference: &str) {
    error!(
      alert = "unknown_order",
      external_reference,
      provider_reference,
      "Payment notification references an order that does not exist."
    );
  }
}
