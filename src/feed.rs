//! Resilient fetch layer over the API-Football v3 feed.
//!
//! Base URL: `https://v3.football.api-sports.io`
//! Auth: `x-apisports-key` header; the key is read from the env var
//! named in `[api].key_env`.
//!
//! The provider is touchy about request rates, so every call goes
//! through a shared pacing gate (minimum inter-call delay plus jitter)
//! and a bounded exponential-backoff retry loop. Responses are cached
//! for the lifetime of the process keyed by (path, sorted params) —
//! identical requests within one run are never re-issued.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::types::{Fixture, LeagueRef, TeamRef};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fetch-layer error taxonomy.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Missing or unusable configuration — raised before any network
    /// call is attempted.
    #[error("configuration: {0}")]
    Config(String),

    /// Timeout, connection failure, 429, or 5xx — already retried with
    /// backoff; carries the final failure.
    #[error("transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    /// Non-retryable upstream response (4xx other than 429), surfaced
    /// immediately.
    #[error("upstream rejected request ({status}): {body}")]
    Upstream { status: StatusCode, body: String },
}

impl FeedError {
    /// Whether the caller may continue the run with partial data.
    pub fn is_upstream(&self) -> bool {
        matches!(self, FeedError::Upstream { .. })
    }
}

/// How a single HTTP attempt should be handled by the retry loop.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Ok,
    /// 429 — back off against the higher rate-limit ceiling.
    RateLimited,
    /// Timeout / connect failure / 5xx — back off and retry.
    Retry,
    /// 4xx other than 429 — give up on this call.
    Fatal,
}

fn classify_status(status: StatusCode) -> Disposition {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Disposition::RateLimited
    } else if status.is_server_error() {
        Disposition::Retry
    } else if status.is_success() {
        Disposition::Ok
    } else {
        Disposition::Fatal
    }
}

/// Exponential backoff: 1, 2, 4, 8… seconds, capped.
fn backoff_delay(attempt: u32, cap: Duration) -> Duration {
    let secs = 2u64.saturating_pow(attempt).min(cap.as_secs().max(1));
    Duration::from_secs(secs)
}

// ---------------------------------------------------------------------------
// Feed seam
// ---------------------------------------------------------------------------

/// A search hit from the leagues endpoint.
#[derive(Debug, Clone)]
pub struct LeagueHit {
    pub id: u64,
    pub name: String,
    pub country: String,
    /// Whether any of the league's seasons is flagged current.
    pub current_season: bool,
}

/// Abstraction over the odds provider.
///
/// The pipeline and the league resolver depend on this trait, not on
/// the concrete HTTP client, so tests can drive them with a
/// deterministic in-memory feed. Odds endpoints return the raw
/// `response` entries; the normalizer owns shape reconciliation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// All fixtures scheduled on the given date.
    async fn fixtures_by_date(&self, date: NaiveDate) -> Result<Vec<Fixture>, FeedError>;

    /// Bookmaker odds entries for a single fixture.
    async fn odds_by_fixture(&self, fixture_id: u64) -> Result<Vec<Value>, FeedError>;

    /// Bookmaker odds entries for every fixture on a date (bulk
    /// fallback source).
    async fn odds_by_date(&self, date: NaiveDate) -> Result<Vec<Value>, FeedError>;

    /// League metadata matching a display-name search.
    async fn search_leagues(&self, name: &str) -> Result<Vec<LeagueHit>, FeedError>;
}

// ---------------------------------------------------------------------------
// API response types (API-Football JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FixtureEnvelope {
    fixture: FixtureCore,
    league: LeagueNode,
    teams: TeamsNode,
}

#[derive(Debug, Deserialize)]
struct FixtureCore {
    id: u64,
    date: DateTime<Utc>,
    #[serde(default)]
    status: StatusNode,
}

#[derive(Debug, Deserialize, Default)]
struct StatusNode {
    #[serde(default)]
    short: String,
}

#[derive(Debug, Deserialize)]
struct LeagueNode {
    id: u64,
    #[serde(default)]
    country: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    season: u32,
}

#[derive(Debug, Deserialize)]
struct TeamsNode {
    home: TeamNode,
    away: TeamNode,
}

#[derive(Debug, Deserialize)]
struct TeamNode {
    id: u64,
    name: String,
}

impl From<FixtureEnvelope> for Fixture {
    fn from(env: FixtureEnvelope) -> Self {
        Fixture {
            id: env.fixture.id,
            kickoff: env.fixture.date,
            status: env.fixture.status.short,
            league: LeagueRef {
                id: env.league.id,
                country: env.league.country,
                name: env.league.name,
                season: env.league.season,
            },
            home: TeamRef { id: env.teams.home.id, name: env.teams.home.name },
            away: TeamRef { id: env.teams.away.id, name: env.teams.away.name },
        }
    }
}

#[derive(Debug, Deserialize)]
struct LeagueSearchEnvelope {
    league: LeagueInfo,
    #[serde(default)]
    country: CountryInfo,
    #[serde(default)]
    seasons: Vec<SeasonInfo>,
}

#[derive(Debug, Deserialize)]
struct LeagueInfo {
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct CountryInfo {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SeasonInfo {
    #[serde(default)]
    current: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the API-Football v3 feed.
pub struct ApiFootballClient {
    http: Client,
    base_url: String,
    api_key: String,
    min_interval: Duration,
    jitter_ms: u64,
    retry_max: u32,
    backoff_cap_rate_limited: Duration,
    backoff_cap_transient: Duration,
    /// Shared pacing gate: instant of the last request start. Held
    /// across the pacing sleep so concurrent callers queue behind one
    /// gate instead of collectively exceeding the request budget.
    last_call: Mutex<Option<Instant>>,
    /// Per-run response cache. The `OnceCell` per key gives
    /// at-most-one-in-flight semantics: a second caller for the same
    /// key awaits the first caller's result. No TTL.
    cache: Mutex<HashMap<String, Arc<OnceCell<Value>>>>,
}

impl ApiFootballClient {
    /// Build a client from config, resolving the API key from the
    /// configured env var. Fails with `FeedError::Config` before any
    /// network activity when the key is missing.
    pub fn new(cfg: &ApiConfig) -> Result<Self, FeedError> {
        let api_key = std::env::var(&cfg.key_env)
            .map_err(|_| FeedError::Config(format!("missing API key env var {}", cfg.key_env)))?;
        if api_key.trim().is_empty() {
            return Err(FeedError::Config(format!("API key env var {} is empty", cfg.key_env)));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent("parlay/0.1.0")
            .build()
            .map_err(|e| FeedError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            min_interval: Duration::from_millis(cfg.min_interval_ms),
            jitter_ms: cfg.jitter_ms,
            retry_max: cfg.retry_max.max(1),
            backoff_cap_rate_limited: Duration::from_secs(cfg.backoff_cap_rate_limited_secs),
            backoff_cap_transient: Duration::from_secs(cfg.backoff_cap_transient_secs),
            last_call: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Cached GET. Identical (path, params) requests within one run are
    /// served from memory, never re-issued.
    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, FeedError> {
        let key = cache_key(path, params);
        let cell = {
            let mut cache = self.cache.lock().await;
            Arc::clone(cache.entry(key).or_insert_with(|| Arc::new(OnceCell::new())))
        };
        cell.get_or_try_init(|| self.get_uncached(path, params))
            .await
            .cloned()
    }

    async fn get_uncached(&self, path: &str, params: &[(&str, String)]) -> Result<Value, FeedError> {
        let url = format!(
            "{}{}{}",
            self.base_url,
            if path.starts_with('/') { "" } else { "/" },
            path,
        );

        let mut last_message = String::new();
        for attempt in 0..self.retry_max {
            self.wait_for_slot().await;

            let resp = match self
                .http
                .get(&url)
                .header("x-apisports-key", &self.api_key)
                .query(params)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_message = format!("transport: {e}");
                    let delay = backoff_delay(attempt, self.backoff_cap_transient);
                    warn!(path, attempt, error = %e, delay_secs = delay.as_secs(), "Request failed, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = resp.status();
            match classify_status(status) {
                Disposition::Ok => match resp.json::<Value>().await {
                    Ok(value) => {
                        debug!(path, attempt, "Feed request ok");
                        return Ok(value);
                    }
                    Err(e) => {
                        last_message = format!("decode: {e}");
                        let delay = backoff_delay(attempt, self.backoff_cap_transient);
                        warn!(path, attempt, error = %e, "Undecodable response body, retrying");
                        tokio::time::sleep(delay).await;
                    }
                },
                Disposition::RateLimited => {
                    last_message = "rate limited (429)".to_string();
                    let delay = backoff_delay(attempt, self.backoff_cap_rate_limited);
                    warn!(path, attempt, delay_secs = delay.as_secs(), "Rate limited by feed, backing off");
                    tokio::time::sleep(delay).await;
                }
                Disposition::Retry => {
                    last_message = format!("server error {status}");
                    let delay = backoff_delay(attempt, self.backoff_cap_transient);
                    warn!(path, attempt, %status, delay_secs = delay.as_secs(), "Server error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Disposition::Fatal => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(FeedError::Upstream { status, body });
                }
            }
        }

        Err(FeedError::Transient { attempts: self.retry_max, message: last_message })
    }

    /// Enforce the minimum inter-call delay plus jitter. The gate mutex
    /// stays locked across the sleep: all callers share one budget.
    async fn wait_for_slot(&self) {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        let pause = self.min_interval + Duration::from_millis(jitter);

        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < pause {
                tokio::time::sleep(pause - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Entries under the standard API-Football `response` envelope.
    fn response_entries(value: &Value) -> Vec<Value> {
        value
            .get("response")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

/// Canonical cache key: path plus sorted, url-encoded params.
fn cache_key(path: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort();
    let query: Vec<String> = sorted
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    format!("{path}?{}", query.join("&"))
}

#[async_trait]
impl OddsFeed for ApiFootballClient {
    async fn fixtures_by_date(&self, date: NaiveDate) -> Result<Vec<Fixture>, FeedError> {
        let value = self
            .get("/fixtures", &[("date", date.format("%Y-%m-%d").to_string())])
            .await?;
        let entries = Self::response_entries(&value);
        let mut fixtures = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<FixtureEnvelope>(entry) {
                Ok(env) => fixtures.push(env.into()),
                Err(e) => debug!(error = %e, "Skipping unparsable fixture entry"),
            }
        }
        Ok(fixtures)
    }

    async fn odds_by_fixture(&self, fixture_id: u64) -> Result<Vec<Value>, FeedError> {
        let value = self
            .get("/odds", &[("fixture", fixture_id.to_string())])
            .await?;
        Ok(Self::response_entries(&value))
    }

    async fn odds_by_date(&self, date: NaiveDate) -> Result<Vec<Value>, FeedError> {
        let value = self
            .get("/odds", &[("date", date.format("%Y-%m-%d").to_string())])
            .await?;
        Ok(Self::response_entries(&value))
    }

    async fn search_leagues(&self, name: &str) -> Result<Vec<LeagueHit>, FeedError> {
        let value = self
            .get("/leagues", &[("search", name.to_string())])
            .await?;
        let entries = Self::response_entries(&value);
        let mut hits = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<LeagueSearchEnvelope>(entry) {
                Ok(env) => hits.push(LeagueHit {
                    id: env.league.id,
                    name: env.league.name,
                    country: env.country.name,
                    current_season: env.seasons.iter().any(|s| s.current),
                }),
                Err(e) => debug!(error = %e, "Skipping unparsable league entry"),
            }
        }
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
