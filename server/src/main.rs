// settlement/server/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use settlement::gateway::{GatewayClient, PaymentGateway};
use settlement::ledger::{InMemoryOrderStore, SharedOrderStore};
use settlement::reconcile::{PaymentPoller, UnverifiedSignatures};
use settlement_server::db::PgOrderStore;
use settlement_server::services::MockReceiptNotifier;
use settlement_server::web::configure_app_routes;
use settlement_server::{AppConfig, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

const SWEEP_BATCH: i64 = 50;

async fn open_store(config: &AppConfig) -> std::io::Result<SharedOrderStore> {
  let Some(database_url) = config.database_url.as_deref() else {
    tracing::warn!("DATABASE_URL not set; orders are kept in memory and lost on restart.");
    return Ok(Arc::new(InMemoryOrderStore::new()));
  };

  let store = PgOrderStore::connect(database_url).await.map_err(|e| {
    tracing::error!(error = %e, "Failed to connect to the database.");
    std::io::Error::other(e)
  })?;
  store.migrate().await.map_err(|e| {
    tracing::error!(error = %e, "Failed to run database migrations.");
    std::io::Error::other(e)
  })?;
  tracing::info!("Successfully connected to the database.");
  Ok(Arc::new(store))
}

/// Periodically re-checks payments that never got a webhook.
fn spawn_pending_sweep(poller: Arc<PaymentPoller>, every: Duration, older_than: Duration) {
  actix_web::rt::spawn(async move {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if let Err(e) = poller.sweep_pending(older_than, SWEEP_BATCH).await {
        tracing::warn!(error = %e, "Pending payment sweep failed.");
      }
    }
  });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting settlement server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::other(e.to_string()));
    }
  };

  let store = open_store(&app_config).await?;
  let gateway: Arc<dyn PaymentGateway> = match GatewayClient::new(app_config.gateway_config()) {
    Ok(client) => Arc::new(client),
    Err(e) => {
      tracing::error!(error = %e, "Failed to build the payment gateway client.");
      return Err(std::io::Error::other(e));
    }
  };

  let app_state = AppState::new(
    app_config.clone(),
    store,
    gateway,
    Arc::new(MockReceiptNotifier::default()),
    Arc::new(UnverifiedSignatures),
  );

  spawn_pending_sweep(
    app_state.poller.clone(),
    app_config.poll_interval,
    app_config.pending_sweep_after,
  );

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
