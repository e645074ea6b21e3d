//! Africa's Talking Airtime Client
//!
//! Sends MTN airtime to a reporter's phone when a redemption is approved.
//!
//! API: `POST {base}/version1/airtime/send`, form-encoded, `apiKey` header.
//! A payout succeeds when the top-level `errorMessage` is empty or `"None"`
//! and `responses` carries at least one entry; the first entry's
//! `requestId` becomes the redemption reference.
//!
//! Transport failures (timeouts, refused connections, 5xx, 429) are retried
//! with exponential backoff (1s -> 2s -> 4s -> ..., capped at 60s, ±20%
//! jitter). A response the API actually answered is never retried, so a
//! payout cannot be sent twice because of a retry.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::AirtimeConfig;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::utils::constants::{
    AIRTIME_BASE_RETRY_MS, AIRTIME_CURRENCY, AIRTIME_MAX_ATTEMPTS, AIRTIME_MAX_RETRY_MS,
    AIRTIME_TIMEOUT_SECS, RETRY_JITTER_PERCENT, USER_AGENT,
};

/// Anything that can top up a phone with airtime
#[async_trait]
pub trait AirtimeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send `amount` (GHS) of airtime, returning the provider's request id
    async fn send_airtime(&self, phone: &str, amount: f64) -> AppResult<String>;
}

// ============================================
// RESPONSE TYPES
// ============================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub num_sent: Option<u32>,
    #[serde(default)]
    pub responses: Vec<SendEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEntry {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn is_error_message(msg: &Option<String>) -> bool {
    msg.as_deref()
        .map(str::trim)
        .map_or(false, |m| !m.is_empty() && m != "None")
}

/// Decide the outcome of an answered request
pub fn parse_send_response(response: &SendResponse) -> AppResult<String> {
    if is_error_message(&response.error_message) {
        return Err(AppError::airtime(format!(
            "Airtime provider error: {}",
            response.error_message.as_deref().unwrap_or_default()
        )));
    }

    let entry = response
        .responses
        .first()
        .ok_or_else(|| AppError::airtime("Airtime provider returned no recipients"))?;

    if is_error_message(&entry.error_message) {
        return Err(AppError::airtime(format!(
            "Airtime recipient error: {}",
            entry.error_message.as_deref().unwrap_or_default()
        )));
    }

    Ok(entry.request_id.clone().unwrap_or_default())
}

/// `[{"phoneNumber":"...","amount":"GHS 5.00"}]`
pub fn recipients_payload(phone: &str, amount: f64) -> String {
    serde_json::json!([{
        "phoneNumber": phone,
        "amount": format!("{} {:.2}", AIRTIME_CURRENCY, amount),
    }])
    .to_string()
}

/// Backoff before retry number `attempt` (1-based), jittered ±20%
pub fn retry_delay_ms(attempt: u32, base_ms: u64) -> u64 {
    let exp = attempt.saturating_sub(1).min(16);
    let capped_delay = base_ms.saturating_mul(2_u64.pow(exp)).min(AIRTIME_MAX_RETRY_MS);

    let jitter_range = (capped_delay * RETRY_JITTER_PERCENT) / 100;
    let jitter: i64 = if jitter_range > 0 {
        rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64))
    } else {
        0
    };
    (capped_delay as i64 + jitter).max(0) as u64
}

// ============================================
// CLIENT
// ============================================

pub struct AfricasTalkingClient {
    client: reqwest::Client,
    username: String,
    api_key: String,
    endpoint: String,
    max_attempts: u32,
    base_retry_ms: u64,
}

impl AfricasTalkingClient {
    pub fn new(config: &AirtimeConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(AIRTIME_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| AppError::with_source(ErrorCode::ConfigInvalidValue, "HTTP client build failed", e))?;

        if config.api_key.is_empty() {
            warn!("AT_API_KEY is empty, airtime payouts will fail");
        }

        Ok(Self {
            client,
            username: config.username.clone(),
            api_key: config.api_key.clone(),
            endpoint: format!("{}/version1/airtime/send", config.base_url.trim_end_matches('/')),
            max_attempts: AIRTIME_MAX_ATTEMPTS,
            base_retry_ms: AIRTIME_BASE_RETRY_MS,
        })
    }

    /// Override the retry schedule
    pub fn with_retry(mut self, max_attempts: u32, base_retry_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_retry_ms = base_retry_ms;
        self
    }

    async fn send_once(&self, phone: &str, amount: f64) -> AppResult<String> {
        let recipients = recipients_payload(phone, amount);
        let response = self
            .client
            .post(&self.endpoint)
            .header("apiKey", &self.api_key)
            .header("Accept", "application/json")
            .form(&[("username", self.username.as_str()), ("recipients", recipients.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::new(ErrorCode::ApiRateLimited, "Airtime provider rate limited"));
        }
        if status.is_server_error() {
            return Err(AppError::new(
                ErrorCode::ExternalConnectionFailed,
                format!("Airtime provider HTTP {}", status),
            ));
        }

        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| AppError::airtime(format!("Unreadable airtime response (HTTP {}): {}", status, e)))?;
        debug!(num_sent = ?body.num_sent, entries = body.responses.len(), "Airtime response");

        parse_send_response(&body)
    }
}

#[async_trait]
impl AirtimeProvider for AfricasTalkingClient {
    fn name(&self) -> &'static str {
        "africastalking"
    }

    async fn send_airtime(&self, phone: &str, amount: f64) -> AppResult<String> {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = retry_delay_ms(attempt, self.base_retry_ms);
                debug!(attempt = attempt + 1, max = self.max_attempts, delay_ms = delay, "Retrying airtime send");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.send_once(phone, amount).await {
                Ok(request_id) => {
                    info!(amount, request_id = %request_id, "Airtime sent");
                    return Ok(request_id);
                }
                Err(e) if e.code.is_retryable() => {
                    warn!(attempt = attempt + 1, error = %e, "Airtime send failed, will retry");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::airtime("Airtime send failed")))
    }
}
