//! Run orchestration.
//!
//! One run is a single pass: resolve the league scope, fetch and filter
//! the day's fixtures, normalize odds per fixture (falling back to the
//! date-scoped bulk feed when the per-fixture endpoint comes back
//! empty), then hand everything to the assembler. Blocking on the trait
//! seam rather than the concrete client keeps the whole pipeline
//! drivable from tests.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::assemble::Assembler;
use crate::config::AppConfig;
use crate::feed::OddsFeed;
use crate::leagues::resolve_scope;
use crate::odds::{normalize_daily_odds, normalize_fixture_odds};
use crate::types::{OddsTable, Ticket};

/// The full fetch → normalize → assemble pipeline for one run.
pub struct TicketPipeline<F: OddsFeed> {
    feed: F,
    cfg: AppConfig,
}

impl<F: OddsFeed> TicketPipeline<F> {
    pub fn new(feed: F, cfg: AppConfig) -> Self {
        Self { feed, cfg }
    }

    /// Run the pipeline for one date. Zero tickets is a normal outcome.
    pub async fn run(&self, date: NaiveDate) -> Result<Vec<Ticket>> {
        let cfg = &self.cfg;

        // 1. League scope (once per run, read-only afterwards)
        let scope = resolve_scope(&self.feed, &cfg.leagues.preferred, &cfg.leagues.fallback_ids)
            .await
            .context("League scope resolution failed")?;

        // 2. Fixtures
        let mut fixtures = self
            .feed
            .fixtures_by_date(date)
            .await
            .context("Fixture fetch failed")?;
        let scanned = fixtures.len();
        fixtures.retain(|f| !cfg.fixtures.skip_statuses.iter().any(|s| s == &f.status));
        info!(scanned, eligible = fixtures.len(), "Fixtures filtered by status");

        // In-scope leagues first so the per-run cap cuts the tail, not
        // the preferred fixtures.
        fixtures.sort_by_key(|f| (!scope.allows(f.league.id), f.kickoff));
        if fixtures.len() > cfg.fixtures.max_per_run {
            warn!(
                dropped = fixtures.len() - cfg.fixtures.max_per_run,
                cap = cfg.fixtures.max_per_run,
                "Fixture list over the per-run cap, truncating"
            );
            fixtures.truncate(cfg.fixtures.max_per_run);
        }

        // 3. Odds per fixture, bulk feed as fallback
        let mut tables: HashMap<u64, OddsTable> = HashMap::new();
        let mut daily: Option<HashMap<u64, OddsTable>> = None;

        for fixture in &fixtures {
            let entries = match self.feed.odds_by_fixture(fixture.id).await {
                Ok(entries) => entries,
                Err(e) if e.is_upstream() => {
                    warn!(fixture = fixture.id, error = %e, "Odds fetch rejected upstream, skipping fixture");
                    continue;
                }
                Err(e) => return Err(e).context("Odds fetch failed"),
            };

            let mut table = normalize_fixture_odds(&entries);
            if table.is_empty() {
                if daily.is_none() {
                    daily = Some(self.fetch_daily_tables(date).await?);
                }
                if let Some(fallback) = daily.as_ref().and_then(|d| d.get(&fixture.id)) {
                    debug!(fixture = fixture.id, "Using bulk date feed for fixture odds");
                    table = fallback.clone();
                }
            }

            if table.is_empty() {
                debug!(fixture = fixture.id, "No parsable odds for fixture");
                continue;
            }
            tables.insert(fixture.id, table);
        }
        info!(
            fixtures = fixtures.len(),
            with_odds = tables.len(),
            "Odds normalized"
        );

        // 4. Assemble
        let assembler = Assembler::new(
            &cfg.tiers,
            &scope,
            cfg.tickets.min_legs,
            cfg.tickets.max_legs,
        );
        let tickets = assembler.assemble(&fixtures, &tables, &cfg.tickets.targets);
        info!(tickets = tickets.len(), "Run complete");
        Ok(tickets)
    }

    /// The date-scoped bulk odds feed, normalized per fixture. An
    /// upstream rejection here only disables the fallback.
    async fn fetch_daily_tables(&self, date: NaiveDate) -> Result<HashMap<u64, OddsTable>> {
        match self.feed.odds_by_date(date).await {
            Ok(entries) => Ok(normalize_daily_odds(&entries)),
            Err(e) if e.is_upstream() => {
                warn!(error = %e, "Bulk odds feed rejected upstream, fallback disabled");
                Ok(HashMap::new())
            }
            Err(e) => Err(e).context("Bulk odds fetch failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
