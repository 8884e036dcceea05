//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the feed API key) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. Market rules and
//! ticket targets are plain data here — the engine has no hard-coded
//! rule tables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::{PriceTarget, RuleTier};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub fixtures: FixturesConfig,
    pub leagues: LeaguesConfig,
    pub tickets: TicketsConfig,
    /// Relaxation tiers in escalation order, strictest first.
    pub tiers: Vec<RuleTier>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Name of the env var holding the API key.
    pub key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum delay between two requests, before jitter.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Upper bound of the uniform jitter added to every inter-call delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,
    /// Backoff ceiling (seconds) when the provider rate-limits us (429).
    #[serde(default = "default_backoff_cap_rate_limited")]
    pub backoff_cap_rate_limited_secs: u64,
    /// Backoff ceiling (seconds) for other transient failures.
    #[serde(default = "default_backoff_cap_transient")]
    pub backoff_cap_transient_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FixturesConfig {
    /// Short status codes excluded from candidate generation (finished,
    /// live, abandoned, postponed and the like).
    pub skip_statuses: Vec<String>,
    /// Hard cap on fixtures considered per run.
    #[serde(default = "default_max_per_run")]
    pub max_per_run: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LeaguesConfig {
    /// (country, league-display-name) preferences resolved via search.
    #[serde(default)]
    pub preferred: Vec<LeaguePreference>,
    /// Known-good league ids unioned into the scope regardless of what
    /// the search resolves; defends against upstream naming drift.
    #[serde(default)]
    pub fallback_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LeaguePreference {
    pub country: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TicketsConfig {
    pub min_legs: usize,
    pub max_legs: usize,
    /// Ordered per-ticket price targets; one assembly pass per entry.
    pub targets: Vec<PriceTarget>,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_min_interval_ms() -> u64 {
    350
}
fn default_jitter_ms() -> u64 {
    150
}
fn default_retry_max() -> u32 {
    4
}
fn default_backoff_cap_rate_limited() -> u64 {
    30
}
fn default_backoff_cap_transient() -> u64 {
    15
}
fn default_max_per_run() -> usize {
    120
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketRule, Objective};

    const SAMPLE: &str = r#"
        [api]
        base_url = "https://v3.football.api-sports.io"
        key_env = "API_FOOTBALL_KEY"
        min_interval_ms = 333

        [fixtures]
        skip_statuses = ["FT", "PST", "LIVE"]
        max_per_run = 50

        [leagues]
        preferred = [
            { country = "England", name = "Premier League" },
            { country = "Spain", name = "La Liga" },
        ]
        fallback_ids = [39, 140]

        [tickets]
        min_legs = 2
        max_legs = 6
        targets = [
            { total = 3.0 },
            { total = 2.0, objective = "closest-fit" },
        ]

        [[tiers]]
        name = "primary"
        scoped = true

        [[tiers.rules]]
        kind = "band"
        market = "double-chance"
        outcome = "1X"
        min = 1.2
        max = 1.45

        [[tiers]]
        name = "relaxed"

        [[tiers.rules]]
        kind = "cap"
        market = "match-result"
        outcome = "Home"
        max = 1.45
    "#;

    #[test]
    fn test_parse_sample_config() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.api.key_env, "API_FOOTBALL_KEY");
        assert_eq!(cfg.api.min_interval_ms, 333);
        // Unset knobs fall back to defaults.
        assert_eq!(cfg.api.retry_max, 4);
        assert_eq!(cfg.api.timeout_secs, 30);

        assert_eq!(cfg.fixtures.skip_statuses.len(), 3);
        assert_eq!(cfg.fixtures.max_per_run, 50);
        assert_eq!(cfg.leagues.preferred.len(), 2);
        assert_eq!(cfg.leagues.fallback_ids, vec![39, 140]);

        assert_eq!(cfg.tickets.min_legs, 2);
        assert_eq!(cfg.tickets.targets.len(), 2);
        assert_eq!(cfg.tickets.targets[0].objective, Objective::FewestLegs);
        assert_eq!(cfg.tickets.targets[1].objective, Objective::ClosestFit);

        assert_eq!(cfg.tiers.len(), 2);
        assert!(cfg.tiers[0].scoped);
        assert!(!cfg.tiers[1].scoped);
        assert!(matches!(cfg.tiers[0].rules[0], MarketRule::Band { .. }));
        assert!(matches!(cfg.tiers[1].rules[0], MarketRule::Cap { .. }));
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = AppConfig::load("/tmp/parlay_no_such_config.toml");
        assert!(result.is_err());
    }
}
