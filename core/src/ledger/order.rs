// settlement/src/ledger/order.rs

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Fulfillment lifecycle. Declaration order is the forward order; `Cancelled`
/// sits outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }

  /// Position along the forward path. `None` for `Cancelled`.
  pub fn rank(self) -> Option<u8> {
    match self {
      OrderStatus::Pending => Some(0),
      OrderStatus::Confirmed => Some(1),
      OrderStatus::Processing => Some(2),
      OrderStatus::Shipped => Some(3),
      OrderStatus::Delivered => Some(4),
      OrderStatus::Cancelled => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "PENDING",
      OrderStatus::Confirmed => "CONFIRMED",
      OrderStatus::Processing => "PROCESSING",
      OrderStatus::Shipped => "SHIPPED",
      OrderStatus::Delivered => "DELIVERED",
      OrderStatus::Cancelled => "CANCELLED",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
  Pending,
  Paid,
  Failed,
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentStatus::Pending => "PENDING",
      PaymentStatus::Paid => "PAID",
      PaymentStatus::Failed => "FAILED",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
  OrangeMoney,
  MobileMoney,
}

impl PaymentMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentMethod::OrangeMoney => "ORANGE_MONEY",
      PaymentMethod::MobileMoney => "MOBILE_MONEY",
    }
  }
}

/// Outcome of a payment attempt in the ledger's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
  Successful,
  Failed,
  Pending,
}

impl PaymentOutcome {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentOutcome::Successful => "SUCCESSFUL",
      PaymentOutcome::Failed => "FAILED",
      PaymentOutcome::Pending => "PENDING",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unknown variant '{}'", self.0)
  }
}

impl std::error::Error for UnknownVariant {}

macro_rules! str_enum {
  ($ty:ty { $($lit:literal => $variant:expr),+ $(,)? }) => {
    impl FromStr for $ty {
      type Err = UnknownVariant;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
          $($lit => Ok($variant),)+
          other => Err(UnknownVariant(other.to_string())),
        }
      }
    }

    impl fmt::Display for $ty {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }
  };
}

str_enum!(OrderStatus {
  "PENDING" => OrderStatus::Pending,
  "CONFIRMED" => OrderStatus::Confirmed,
  "PROCESSING" => OrderStatus::Processing,
  "SHIPPED" => OrderStatus::Shipped,
  "DELIVERED" => OrderStatus::Delivered,
  "CANCELLED" => OrderStatus::Cancelled,
});

str_enum!(PaymentStatus {
  "PENDING" => PaymentStatus::Pending,
  "PAID" => PaymentStatus::Paid,
  "FAILED" => PaymentStatus::Failed,
});

str_enum!(PaymentMethod {
  "ORANGE_MONEY" => PaymentMethod::OrangeMoney,
  "MOBILE_MONEY" => PaymentMethod::MobileMoney,
});

str_enum!(PaymentOutcome {
  "SUCCESSFUL" => PaymentOutcome::Successful,
  "FAILED" => PaymentOutcome::Failed,
  "PENDING" => PaymentOutcome::Pending,
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  pub status: OrderStatus,
  pub payment_status: PaymentStatus,
  pub payment_method: PaymentMethod,
  /// Provider-side reference, once the gateway assigned one.
  pub transaction_id: Option<String>,
  pub total_amount: i64,
  pub delivery_fee: i64,
  pub last_outcome: Option<PaymentOutcome>,
  pub outcome_observed_at: Option<DateTime<Utc>>,
  pub paid_at: Option<DateTime<Utc>>,
  /// Bumped on every committed mutation; the optimistic concurrency token.
  pub version: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  pub fn is_paid(&self) -> bool {
    self.payment_status == PaymentStatus::Paid
  }
}

/// What checkout hands the ledger to open an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
  /// Generated when absent.
  pub order_number: Option<String>,
  pub payment_method: PaymentMethod,
  pub total_amount: i64,
  pub delivery_fee: i64,
}

/// `INV-{year}-{8 hex}`. Collisions are still caught by the store's unique key.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
  let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
  format!("INV-{}-{}", now.year(), suffix)
}
