// settlement/server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use settlement::gateway::{GatewayConfig, DEFAULT_BASE_URL, DEFAULT_CURRENCY};
use settlement::reconcile::PollPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// Absent means the in-memory store; fine for local runs, never for production.
  pub database_url: Option<String>,

  pub campay_api_url: String,
  pub campay_username: String,
  pub campay_password: String,
  pub payment_currency: String,
  pub gateway_timeout: Duration,
  pub gateway_token_ttl: Duration,

  pub poll_interval: Duration,
  pub poll_max_attempts: u32,
  /// Pending payments older than this are swept by the background poller.
  pub pending_sweep_after: Duration,
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match env::var(name) {
    Ok(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
    Err(_) => Ok(default),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = parse_var("SERVER_PORT", 8080u16)?;
    let database_url = get_env("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());

    let campay_api_url = get_env("CAMPAY_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let campay_username = get_env("CAMPAY_USERNAME")?;
    let campay_password = get_env("CAMPAY_PASSWORD")?;
    let payment_currency = get_env("PAYMENT_CURRENCY").unwrap_or_else(|_| DEFAULT_CURRENCY.to_string());
    let gateway_timeout = Duration::from_secs(parse_var("GATEWAY_TIMEOUT_SECS", 15u64)?);
    let gateway_token_ttl = Duration::from_secs(parse_var("GATEWAY_TOKEN_TTL_SECS", 3000u64)?);

    let poll_interval = Duration::from_secs(parse_var("POLL_INTERVAL_SECS", 30u64)?);
    let poll_max_attempts = parse_var("POLL_MAX_ATTEMPTS", 10u32)?;
    if poll_max_attempts == 0 {
      return Err(AppError::Config("POLL_MAX_ATTEMPTS must be at least 1".to_string()));
    }
    let pending_sweep_after = Duration::from_secs(parse_var("PENDING_SWEEP_AFTER_SECS", 600u64)?);

    tracing::info!(
      gateway = %campay_api_url,
      persistent_store = database_url.is_some(),
      "Application configuration loaded successfully."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      campay_api_url,
      campay_username,
      campay_password,
      payment_currency,
      gateway_timeout,
      gateway_token_ttl,
      poll_interval,
      poll_max_attempts,
      pending_sweep_after,
    })
  }

  pub fn gateway_config(&self) -> GatewayConfig {
    let mut config = GatewayConfig::new(&self.campay_api_url, &self.campay_username, &self.campay_password);
    config.currency = self.payment_currency.clone();
    config.request_timeout = self.gateway_timeout;
    config.token_ttl = self.gateway_token_ttl;
    config
  }

  pub fn poll_policy(&self) -> PollPolicy {
    PollPolicy {
      interval: self.poll_interval,
      max_attempts: self.poll_max_attempts,
    }
  }

  /// Settings for tests and local tooling; no environment involved.
  pub fn for_local(campay_api_url: impl Into<String>) -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: None,
      campay_api_url: campay_api_url.into(),
      campay_username: "local".to_string(),
      campay_password: "local".to_string(),
      payment_currency: DEFAULT_CURRENCY.to_string(),
      gateway_timeout: Duration::from_secs(15),
      gateway_token_ttl: Duration::from_secs(3000),
      poll_interval: Duration::from_secs(30),
      poll_max_attempts: 10,
      pending_sweep_after: Duration::from_secs(600),
    }
  }
}
