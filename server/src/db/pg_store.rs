// settlement/server/src/db/pg_store.rs

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use settlement::ledger::{Order, OrderStore, PaymentOutcome};
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, order_number, status, payment_status, payment_method, transaction_id, \
   total_amount, delivery_fee, last_outcome, outcome_observed_at, paid_at, version, created_at, updated_at";

/// Row shape of `orders`. Enum columns are TEXT and parsed on the way out.
#[derive(Debug, FromRow)]
struct OrderRow {
  id: Uuid,
  order_number: String,
  status: String,
  payment_status: String,
  payment_method: String,
  transaction_id: Option<String>,
  total_amount: i64,
  delivery_fee: i64,
  last_outcome: Option<String>,
  outcome_observed_at: Option<DateTime<Utc>>,
  paid_at: Option<DateTime<Utc>>,
  version: i64,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
  type Error = anyhow::Error;

  fn try_from(row: OrderRow) -> anyhow::Result<Self> {
    let last_outcome = row
      .last_outcome
      .as_deref()
      .map(str::parse::<PaymentOutcome>)
      .transpose()
      .context("orders.last_outcome")?;
    Ok(Order {
      id: row.id,
      status: row.status.parse().context("orders.status")?,
      payment_status: row.payment_status.parse().context("orders.payment_status")?,
      payment_method: row.payment_method.parse().context("orders.payment_method")?,
      order_number: row.order_number,
      transaction_id: row.transaction_id,
      total_amount: row.total_amount,
      delivery_fee: row.delivery_fee,
      last_outcome,
      outcome_observed_at: row.outcome_observed_at,
      paid_at: row.paid_at,
      version: row.version,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

/// `OrderStore` over Postgres. The version column carries the optimistic
/// concurrency check; no row locks are taken.
#[derive(Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
    let pool = PgPool::connect(database_url).await?;
    Ok(Self::new(pool))
  }

  /// Applies the bundled migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(&self.pool).await
  }
}

#[async_trait]
impl OrderStore for PgOrderStore {
  #[instrument(name = "PgOrderStore::insert", skip_all, fields(order_number = %order.order_number))]
  async fn insert(&self, order: &Order) -> anyhow::Result<bool> {
    let result = sqlx::query(
      "INSERT INTO orders (id, order_number, status, payment_status, payment_method, transaction_id, \
         total_amount, delivery_fee, last_outcome, outcome_observed_at, paid_at, version, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
       ON CONFLICT (order_number) DO NOTHING",
    )
    .bind(order.id)
    .bind(&order.order_number)
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(order.payment_method.as_str())
    .bind(&order.transaction_id)
    .bind(order.total_amount)
    .bind(order.delivery_fee)
    .bind(order.last_outcome.map(PaymentOutcome::as_str))
    .bind(order.outcome_observed_at)
    .bind(order.paid_at)
    .bind(order.version)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&self.pool)
    .await
    .context("inserting order")?;

    Ok(result.rows_affected() == 1)
  }

  async fn find_by_number(&self, order_number: &str) -> anyhow::Result<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"))
      .bind(order_number)
      .fetch_optional(&self.pool)
      .await
      .context("loading order")?;
    row.map(Order::try_from).transpose()
  }

  #[instrument(name = "PgOrderStore::compare_and_swap", skip_all, fields(order_number = %next.order_number, expected_version = expected_version))]
  async fn compare_and_swap(&self, expected_version: i64, next: &Order) -> anyhow::Result<bool> {
    let result = sqlx::query(
      "UPDATE orders SET status = $3, payment_status = $4, transaction_id = $5, last_outcome = $6, \
         outcome_observed_at = $7, paid_at = $8, updated_at = $9, version = version + 1 \
       WHERE id = $1 AND version = $2",
    )
    .bind(next.id)
    .bind(expected_version)
    .bind(next.status.as_str())
    .bind(next.payment_status.as_str())
    .bind(&next.transaction_id)
    .bind(next.last_outcome.map(PaymentOutcome::as_str))
    .bind(next.outcome_observed_at)
    .bind(next.paid_at)
    .bind(next.updated_at)
    .execute(&self.pool)
    .await
    .context("updating order")?;

    let swapped = result.rows_affected() == 1;
    if !swapped {
      debug!("Version check failed.");
    }
    Ok(swapped)
  }

  async fn pending_payments(&self, created_before: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<Order>> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
      "SELECT {ORDER_COLUMNS} FROM orders \
       WHERE payment_status = 'PENDING' AND transaction_id IS NOT NULL AND created_at < $1 \
         AND status NOT IN ('DELIVERED', 'CANCELLED') \
       ORDER BY created_at LIMIT $2"
    ))
    .bind(created_before)
    .bind(limit.max(0))
    .fetch_all(&self.pool)
    .await
    .context("listing pending payments")?;

    rows.into_iter().map(Order::try_from).collect()
  }
}
