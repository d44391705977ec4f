// settlement/src/gateway/token.rs

//! Process-wide bearer token cache with single-flight refresh.
//!
//! At most one refresh is in flight. Callers that find one running await the
//! same shared future and get the same token or the same error. The mutex only
//! guards the slot; it is never held while the refresh runs.

use crate::error::GatewayResult;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayToken {
  pub value: String,
  pub expires_at: Instant,
}

impl GatewayToken {
  pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
    Self {
      value: value.into(),
      expires_at: Instant::now() + ttl,
    }
  }

  /// Still usable for at least `margin`.
  pub fn is_fresh(&self, margin: Duration) -> bool {
    Instant::now() + margin < self.expires_at
  }
}

type RefreshFuture = Shared<BoxFuture<'static, GatewayResult<GatewayToken>>>;

enum Slot {
  Empty,
  Ready(GatewayToken),
  Refreshing(RefreshFuture),
}

pub struct TokenCache {
  slot: Mutex<Slot>,
  refresh_margin: Duration,
}

impl Default for TokenCache {
  fn default() -> Self {
    Self::new(Duration::from_secs(30))
  }
}

impl TokenCache {
  /// `refresh_margin`: tokens closer than this to expiry are refreshed.
  pub fn new(refresh_margin: Duration) -> Self {
    Self {
      slot: Mutex::new(Slot::Empty),
      refresh_margin,
    }
  }

  /// Returns the cached token, or joins/starts a refresh using `fetch`.
  /// `fetch` is only invoked when this caller starts the refresh.
  pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> GatewayResult<GatewayToken>
  where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = GatewayResult<GatewayToken>> + Send + 'static,
  {
    let refresh = {
      let mut slot = self.slot.lock();
      match &*slot {
        Slot::Ready(token) if token.is_fresh(self.refresh_margin) => return Ok(token.clone()),
        Slot::Refreshing(in_flight) => {
          debug!("Joining in-flight gateway token refresh.");
          in_flight.clone()
        }
        _ => {
          debug!("Starting gateway token refresh.");
          let started = fetch().boxed().shared();
          *slot = Slot::Refreshing(started.clone());
          started
        }
      }
    };

    let result = refresh.clone().await;

    let mut slot = self.slot.lock();
    // Whoever observes completion first publishes it; a newer refresh that
    // replaced this one is left alone.
    if let Slot::Refreshing(current) = &*slot {
      if current.ptr_eq(&refresh) {
        *slot = match &result {
          Ok(token) => Slot::Ready(token.clone()),
          Err(e) => {
            warn!(error = %e, "Gateway token refresh failed.");
            Slot::Empty
          }
        };
      }
    }
    result
  }

  /// Drops a cached token the provider no longer accepts. An in-flight
  /// refresh is kept.
  pub fn invalidate(&self, rejected: &GatewayToken) {
    let mut slot = self.slot.lock();
    if matches!(&*slot, Slot::Ready(token) if token.value == rejected.value) {
      *slot = Slot::Empty;
    }
  }
}
