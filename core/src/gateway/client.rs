// settlement/src/gateway/client.rs

use super::token::{GatewayToken, TokenCache};
use super::{outcome_from_provider, Collection, CollectionRequest, GatewayConfig, PaymentGateway, StatusReport};
use crate::error::{GatewayError, GatewayResult};
use crate::ledger::PaymentOutcome;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Serialize)]
struct TokenRequest<'a> {
  username: &'a str,
  password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
  token: Option<String>,
  /// Seconds.
  expires_in: Option<u64>,
}

#[derive(Serialize)]
struct CollectBody<'a> {
  amount: String,
  currency: &'a str,
  from: &'a str,
  description: &'a str,
  external_reference: &'a str,
}

#[derive(Deserialize, Default)]
struct CollectResponse {
  reference: Option<String>,
  ussd_code: Option<String>,
  message: Option<String>,
}

#[derive(Deserialize, Default)]
struct TransactionResponse {
  status: Option<String>,
  message: Option<String>,
}

/// HTTP client for the aggregator. Cheap to share behind an `Arc`; the token
/// cache inside is process-wide for whoever holds the client.
pub struct GatewayClient {
  http: Client,
  config: Arc<GatewayConfig>,
  tokens: TokenCache,
}

impl GatewayClient {
  pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
    let http = Client::builder().timeout(config.request_timeout).build()?;
    Ok(Self {
      http,
      config: Arc::new(config),
      tokens: TokenCache::default(),
    })
  }

  pub fn config(&self) -> &GatewayConfig {
    &self.config
  }

  /// Cached bearer token, refreshed single-flight when absent or expiring.
  pub async fn authenticate(&self) -> GatewayResult<GatewayToken> {
    let http = self.http.clone();
    let config = self.config.clone();
    self.tokens.get_or_refresh(move || request_token(http, config)).await
  }

  /// Sends an authenticated request; on 401 the token is dropped and the
  /// request is sent once more with a fresh one.
  async fn send_authorized<B>(&self, build: B) -> GatewayResult<Response>
  where
    B: Fn(&Client, &str) -> RequestBuilder,
  {
    let mut token = self.authenticate().await?;
    for attempt in 0..2 {
      let header = format!("Token {}", token.value);
      let response = build(&self.http, &header).send().await?;
      if response.status() != StatusCode::UNAUTHORIZED {
        return Ok(response);
      }
      warn!(attempt, "Gateway refused the cached token.");
      self.tokens.invalidate(&token);
      if attempt == 0 {
        token = self.authenticate().await?;
      }
    }
    Err(GatewayError::AuthRejected("token refused after refresh".to_string()))
  }
}

#[instrument(name = "GatewayClient::request_token", skip_all, fields(base_url = %config.base_url))]
async fn request_token(http: Client, config: Arc<GatewayConfig>) -> GatewayResult<GatewayToken> {
  let response = http
    .post(config.endpoint("token/"))
    .json(&TokenRequest {
      username: &config.username,
      password: &config.password,
    })
    .send()
    .await?;

  let status = response.status();
  if status.is_server_error() {
    return Err(GatewayError::Unavailable(format!("token endpoint returned {status}")));
  }
  if !status.is_success() {
    return Err(GatewayError::AuthRejected(format!("token endpoint returned {status}")));
  }

  let body: TokenResponse = response
    .json()
    .await
    .map_err(|e| GatewayError::Unavailable(format!("unreadable token response: {e}")))?;
  let value = body
    .token
    .filter(|t| !t.is_empty())
    .ok_or_else(|| GatewayError::Unavailable("token response without token".to_string()))?;
  let ttl = body.expires_in.map(Duration::from_secs).unwrap_or(config.token_ttl);

  info!(ttl_secs = ttl.as_secs(), "Obtained gateway token.");
  Ok(GatewayToken::new(value, ttl))
}

#[async_trait]
impl PaymentGateway for GatewayClient {
  #[instrument(
    name = "GatewayClient::initiate_payment",
    skip(self, request),
    fields(
      external_reference = %request.external_reference,
      method = %request.method,
      amount = request.amount,
    ),
    err(Display)
  )]
  async fn initiate_payment(&self, request: &CollectionRequest) -> GatewayResult<Collection> {
    if request.amount <= 0 {
      return Err(GatewayError::Rejected(format!("amount must be positive, got {}", request.amount)));
    }
    let currency = request.currency.as_deref().unwrap_or(&self.config.currency);
    let body = CollectBody {
      amount: request.amount.to_string(),
      currency,
      from: &request.phone_number,
      description: &request.description,
      external_reference: &request.external_reference,
    };
    let url = self.config.endpoint("collect/");

    let response = self
      .send_authorized(|http, auth| http.post(&url).header("Authorization", auth).json(&body))
      .await?;

    let status = response.status();
    if status.is_server_error() {
      return Err(GatewayError::Unavailable(format!("collect endpoint returned {status}")));
    }
    let parsed: CollectResponse = if status.is_success() {
      // The provider may already have started the collection.
      response.json().await.map_err(|e| {
        warn!(error = %e, %status, "Unreadable collect response.");
        GatewayError::Unavailable(format!("unreadable collect response: {e}"))
      })?
    } else {
      response.json().await.unwrap_or_default()
    };

    match (status.is_success(), parsed.reference) {
      (true, Some(reference)) if !reference.is_empty() => {
        info!(provider_reference = %reference, "Collection initiated.");
        Ok(Collection {
          provider_reference: reference,
          ussd_prompt: parsed.ussd_code,
        })
      }
      _ => {
        let message = parsed
          .message
          .unwrap_or_else(|| format!("collect endpoint returned {status}"));
        Err(GatewayError::Rejected(message))
      }
    }
  }

  #[instrument(name = "GatewayClient::check_status", skip(self), err(Display))]
  async fn check_status(&self, provider_reference: &str) -> GatewayResult<StatusReport> {
    let url = self.config.endpoint(&format!("transaction/{provider_reference}/"));
    let response = self.send_authorized(|http, auth| http.get(&url).header("Authorization", auth)).await?;

    let status = response.status();
    if status.is_server_error() {
      return Err(GatewayError::Unavailable(format!("transaction endpoint returned {status}")));
    }
    if !status.is_success() {
      return Err(GatewayError::Rejected(format!("transaction endpoint returned {status}")));
    }

    let parsed: TransactionResponse = response.json().await.unwrap_or_default();
    let outcome = match parsed.status.as_deref().map(outcome_from_provider) {
      Some(Some(outcome)) => outcome,
      other => {
        // Unverifiable is pending, never success.
        warn!(provider_status = ?parsed.status, recognized = other.is_some(), "Unrecognized transaction status.");
        PaymentOutcome::Pending
      }
    };
    debug!(%outcome, "Transaction status checked.");
    Ok(StatusReport {
      outcome,
      message: parsed.message,
    })
  }
}
