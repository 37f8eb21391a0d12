//! Zoho Creator client: the record source of every sync.
//!
//! Pages through one report of one Creator application with the v2 REST API,
//! refreshing the OAuth access token as needed.
//!
//! # Examples
//!
//! ```no_run
//! use picsync_client::{ZohoClient, ZohoConfig};
//! use picsync_core::batch::DateRange;
//! use picsync_core::traits::RecordSource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ZohoClient::new(ZohoConfig {
//!     client_id: "1000.ABC".to_string(),
//!     client_secret: "secret".to_string(),
//!     refresh_token: "1000.refresh".to_string(),
//!     account_owner: "acme".to_string(),
//!     app_link_name: "field-reports".to_string(),
//!     report_link_name: "All_Photos".to_string(),
//!     ..Default::default()
//! })?;
//! let first = client.fetch_page(0, 100, &DateRange::default()).await?;
//! println!("{} records", first.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use picsync_core::HttpConfig;
use picsync_core::batch::DateRange;
use picsync_core::error::AppError;
use picsync_core::models::SourceRecord;
use picsync_core::traits::RecordSource;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, sleep_until};
use url::Url;

use crate::record::normalize_record;

/// Zoho response code for "no records match".
const NO_RECORDS_CODE: i64 = 3100;

/// Connection settings of the Zoho Creator report.
#[derive(Debug, Clone)]
pub struct ZohoConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub account_owner: String,
    pub app_link_name: String,
    pub report_link_name: String,
    /// Host of the Creator API, e.g. `creator.zoho.eu` for the EU data center.
    pub api_domain: String,
    /// Host of the OAuth token endpoint.
    pub accounts_domain: String,
    /// Client-side request budget.
    pub requests_per_second: u32,
}

impl Default for ZohoConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            account_owner: String::new(),
            app_link_name: String::new(),
            report_link_name: String::new(),
            api_domain: "creator.zoho.com".to_string(),
            accounts_domain: "accounts.zoho.com".to_string(),
            requests_per_second: 5,
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ReportResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct CountResponse {
    #[serde(default)]
    code: i64,
    result: Option<CountResult>,
}

#[derive(Deserialize)]
struct CountResult {
    /// Zoho sends the count as a string or a number depending on the endpoint version.
    records_count: Value,
}

// =============================================================================
// Token cache and rate limiter
// =============================================================================

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spaces requests at least `interval` apart across all clones of the client.
#[derive(Clone)]
struct RateLimiter {
    interval: Duration,
    next_slot: Arc<Mutex<Instant>>,
}

impl RateLimiter {
    fn new(per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / per_second.max(1),
            next_slot: Arc::new(Mutex::new(Instant::now())),
        }
    }

    async fn acquire(&self) {
        let mut next = self.next_slot.lock().await;
        if *next > Instant::now() {
            sleep_until(*next).await;
        }
        *next = Instant::now() + self.interval;
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for one Zoho Creator report.
#[derive(Clone)]
pub struct ZohoClient {
    client: Client,
    config: Arc<ZohoConfig>,
    report_url: Url,
    count_url: Url,
    token_url: Url,
    token: Arc<Mutex<Option<CachedToken>>>,
    limiter: RateLimiter,
    http: Arc<HttpConfig>,
}

impl ZohoClient {
    /// Largest `limit` a single report request accepts.
    pub const MAX_PAGE_SIZE: u32 = 200;

    /// Wait after a 429 before retrying.
    const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

    /// Refresh the token this long before Zoho would expire it.
    const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

    /// Creates a client for the report described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a required setting is empty or the
    /// domains do not form valid URLs.
    pub fn new(config: ZohoConfig) -> Result<Self, AppError> {
        for (name, value) in [
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
            ("refresh_token", &config.refresh_token),
            ("account_owner", &config.account_owner),
            ("app_link_name", &config.app_link_name),
            ("report_link_name", &config.report_link_name),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::ConfigError(format!("Zoho {} is not set", name)));
            }
        }

        let (report_url, count_url, token_url) = Self::endpoints(&config)?;
        let http = HttpConfig::default();
        let client = Client::builder()
            .user_agent(concat!("picsync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .connect_timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(config.requests_per_second),
            config: Arc::new(config),
            report_url,
            count_url,
            token_url,
            token: Arc::new(Mutex::new(None)),
            http: Arc::new(http),
        })
    }

    fn endpoints(config: &ZohoConfig) -> Result<(Url, Url, Url), AppError> {
        let parse = |s: String| {
            Url::parse(&s).map_err(|e| AppError::ConfigError(format!("invalid Zoho URL {}: {}", s, e)))
        };
        let path = format!(
            "{}/{}/report/{}",
            config.account_owner, config.app_link_name, config.report_link_name
        );
        Ok((
            parse(format!("https://{}/api/v2/{}", config.api_domain, path))?,
            parse(format!("https://{}/api/v2.1/{}/count", config.api_domain, path))?,
            parse(format!("https://{}/oauth/v2/token", config.accounts_domain))?,
        ))
    }

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------

    async fn access_token(&self) -> Result<String, AppError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        let resp = self
            .client
            .post(self.token_url.clone())
            .query(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("token refresh failed: {}", e)))?;

        let status = resp.status();
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AppError::AuthError(format!("unreadable token response: {}", e)))?;
        let Some(value) = body.access_token.filter(|_| status.is_success()) else {
            return Err(AppError::AuthError(format!(
                "Zoho rejected the refresh token (HTTP {}): {}",
                status.as_u16(),
                body.error.unwrap_or_else(|| "no access_token in response".to_string())
            )));
        };

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600))
            .saturating_sub(Self::TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::info!(expires_in_secs = lifetime.as_secs(), "Zoho access token refreshed");
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Sends an authenticated, rate-limited GET with retries.
    ///
    /// 401 refreshes the token once; 429 waits out a cooldown; 5xx and connection
    /// errors back off exponentially. Other statuses are returned to the caller.
    async fn get_with_retry(&self, url: &Url) -> Result<Response, AppError> {
        self.send_with_retry(|client| client.get(url.clone())).await
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<Response, AppError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_attempts = self.http.max_retries.max(1);
        let mut attempt = 0;
        let mut token_refreshed = false;

        loop {
            self.limiter.acquire().await;
            let token = self.access_token().await?;
            let result = build(&self.client)
                .header("Authorization", format!("Zoho-oauthtoken {}", token))
                .send()
                .await;

            let failure = match result {
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED && !token_refreshed => {
                    tracing::debug!("Zoho returned 401, refreshing access token");
                    self.invalidate_token().await;
                    token_refreshed = true;
                    continue;
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(AppError::Transport(
                            "Zoho rate limit persisted after retries".to_string(),
                        ));
                    }
                    tracing::warn!(
                        cooldown_secs = Self::RATE_LIMIT_COOLDOWN.as_secs(),
                        "Rate limited by Zoho API"
                    );
                    sleep(Self::RATE_LIMIT_COOLDOWN).await;
                    continue;
                }
                Ok(resp) if resp.status().is_server_error() => {
                    format!("Server error: HTTP {}", resp.status().as_u16())
                }
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => e.to_string(),
                Err(e) => return Err(AppError::ClientError(e.to_string())),
            };

            attempt += 1;
            if attempt >= max_attempts {
                return Err(AppError::Transport(format!(
                    "{} (after {} attempts)",
                    failure, attempt
                )));
            }
            let delay = backoff(self.http.retry_base_delay, self.http.max_retry_delay, attempt);
            tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %failure, "Zoho request failed, retrying");
            sleep(delay).await;
        }
    }

    /// One report request of at most [`Self::MAX_PAGE_SIZE`] records.
    async fn fetch_chunk(
        &self,
        from: u64,
        limit: u32,
        criteria: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>, AppError> {
        let mut url = self.report_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("from", &from.to_string())
                .append_pair("limit", &limit.to_string());
            if let Some(criteria) = criteria {
                pairs.append_pair("criteria", criteria);
            }
        }

        let resp = self.get_with_retry(&url).await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let text = resp
            .text()
            .await
            .map_err(|e| AppError::Transport(format!("reading Zoho response: {}", e)))?;
        parse_report_body(status, &text)
    }

    /// Fetches `limit` records starting at the 0-based `offset`, splitting the
    /// request into chunks the API accepts.
    async fn fetch_range(
        &self,
        offset: u64,
        limit: u32,
        criteria: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>, AppError> {
        let mut records = Vec::new();
        let mut from = offset;

        while records.len() < limit as usize {
            let want = (limit - records.len() as u32).min(Self::MAX_PAGE_SIZE);
            // Zoho's `from` is 1-based
            let chunk = self.fetch_chunk(from + 1, want, criteria).await?;
            let got = chunk.len();
            records.extend(chunk);
            from += got as u64;
            if got < want as usize {
                break;
            }
        }

        Ok(records)
    }
}

/// Backoff for the `attempt`-th retry (1-based): `base * 2^(attempt-1)`, capped.
fn backoff(base: Duration, cap: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .min(cap)
}

/// Extracts the record objects of a report response.
fn parse_report_body(status: StatusCode, body: &str) -> Result<Vec<Map<String, Value>>, AppError> {
    let parsed: ReportResponse = serde_json::from_str(body).map_err(|e| {
        AppError::ClientError(format!("unexpected Zoho response (HTTP {}): {}", status.as_u16(), e))
    })?;

    if parsed.code == NO_RECORDS_CODE {
        return Ok(Vec::new());
    }
    if !status.is_success() {
        return Err(AppError::ClientError(format!(
            "HTTP {} from Zoho: {}",
            status.as_u16(),
            parsed.message.unwrap_or_default()
        )));
    }

    Ok(parsed
        .data
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

fn zoho_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// `criteria` expression restricting `Modified_Time` to `range`, inclusive.
fn range_criteria(range: &DateRange) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(from) = range.from {
        clauses.push(format!("Modified_Time >= '{} 00:00:00'", zoho_date(from)));
    }
    if let Some(to) = range.to {
        clauses.push(format!("Modified_Time <= '{} 23:59:59'", zoho_date(to)));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" && "))
    }
}

fn before_criteria(before: DateTime<Utc>) -> String {
    format!("Added_Time < '{}'", before.format("%d-%b-%Y %H:%M:%S"))
}

fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// RecordSource
// =============================================================================

impl RecordSource for ZohoClient {
    async fn fetch_page(
        &self,
        offset: u64,
        limit: u32,
        range: &DateRange,
    ) -> Result<Vec<SourceRecord>, AppError> {
        let criteria = range_criteria(range);
        let raw = self.fetch_range(offset, limit, criteria.as_deref()).await?;
        tracing::debug!(offset, limit, fetched = raw.len(), "Fetched Zoho records");
        Ok(raw.into_iter().map(normalize_record).collect())
    }

    async fn count(&self, range: &DateRange) -> Result<Option<u64>, AppError> {
        let mut url = self.count_url.clone();
        if let Some(criteria) = range_criteria(range) {
            url.query_pairs_mut().append_pair("criteria", &criteria);
        }

        let resp = match self.get_with_retry(&url).await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "Zoho count unavailable");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Zoho count failed");
                return Ok(None);
            }
        };

        match resp.json::<CountResponse>().await {
            Ok(body) if body.code == NO_RECORDS_CODE => Ok(Some(0)),
            Ok(body) => Ok(body.result.and_then(|r| parse_count(&r.records_count))),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable Zoho count response");
                Ok(None)
            }
        }
    }

    /// The v2 report API has no sort parameter, so every record older than the cursor
    /// is fetched and the newest `limit` are kept.
    async fn fetch_before(
        &self,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<SourceRecord>, AppError> {
        let criteria = before.map(before_criteria);
        let mut records = Vec::new();
        let mut offset = 0u64;
        loop {
            let chunk = self
                .fetch_range(offset, Self::MAX_PAGE_SIZE, criteria.as_deref())
                .await?;
            let got = chunk.len();
            records.extend(chunk.into_iter().map(normalize_record));
            if got < Self::MAX_PAGE_SIZE as usize {
                break;
            }
            offset += got as u64;
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn download_image(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let url = Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{}: {}", url, e)))?;
        let resp = self.get_with_retry(&url).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::ClientError(format!(
                "HTTP {} downloading {}",
                status.as_u16(),
                url
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AppError::NetworkError(format!("download interrupted: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
