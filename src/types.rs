//! Shared types for the PARLAY engine.
//!
//! These types form the data model used across all modules: fixtures as
//! fetched from the feed, canonical market families after normalization,
//! per-fixture odds tables, the rule/tier configuration vocabulary, and
//! the legs and tickets the assembler produces. They are designed to be
//! stable so that feed, odds, and assembly modules can depend on them
//! without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// League metadata attached to a fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeagueRef {
    pub id: u64,
    pub country: String,
    pub name: String,
    pub season: u32,
}

/// One side of a fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamRef {
    pub id: u64,
    pub name: String,
}

/// A scheduled match as reported by the fixtures endpoint.
/// Immutable once fetched; sourced once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: u64,
    pub kickoff: DateTime<Utc>,
    /// Short status code from the feed, e.g. "NS", "FT", "PST".
    pub status: String,
    pub league: LeagueRef,
    pub home: TeamRef,
    pub away: TeamRef,
}

impl fmt::Display for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} vs {} ({} — {})",
            self.id, self.home.name, self.away.name, self.league.country, self.league.name,
        )
    }
}

impl Fixture {
    /// Helper to build a test fixture with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: u64) -> Self {
        Fixture {
            id,
            kickoff: Utc::now() + chrono::Duration::hours(6),
            status: "NS".to_string(),
            league: LeagueRef {
                id: 39,
                country: "England".to_string(),
                name: "Premier League".to_string(),
                season: 2025,
            },
            home: TeamRef { id: 42, name: "Arsenal".to_string() },
            away: TeamRef { id: 49, name: "Chelsea".to_string() },
        }
    }
}

// ---------------------------------------------------------------------------
// Market families
// ---------------------------------------------------------------------------

/// Raw market names containing any of these substrings are side markets
/// we never trade, regardless of how the rest of the name reads.
const NOISE_SUBSTRINGS: &[&str] = &[
    "handicap", "corner", "card", "booking", "penalt", "shootout", "scorer",
];

/// The closed set of bet-type categories the engine recognizes.
/// Every other raw market name from the feed is dropped during
/// normalization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum MarketFamily {
    MatchResult,
    DoubleChance,
    BothTeamsScore,
    GoalsOverUnder,
    FirstHalfGoals,
    HomeTeamGoals,
    AwayTeamGoals,
}

impl MarketFamily {
    /// Map a raw upstream market name to a canonical family.
    ///
    /// Returns `None` both for unrecognized names and for names that hit
    /// the noise filter — callers drop those entries outright.
    pub fn from_feed_name(raw: &str) -> Option<Self> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() || NOISE_SUBSTRINGS.iter().any(|s| name.contains(s)) {
            return None;
        }

        // Totals come in many spellings; team totals and first-half
        // totals must win over the plain full-match family.
        if name.contains("over/under") || name.contains("over under") || name.contains("total") {
            if name.contains("home") {
                return Some(MarketFamily::HomeTeamGoals);
            }
            if name.contains("away") {
                return Some(MarketFamily::AwayTeamGoals);
            }
            if name.contains("first half") || name.contains("1st half") {
                return Some(MarketFamily::FirstHalfGoals);
            }
            return Some(MarketFamily::GoalsOverUnder);
        }

        match name.as_str() {
            "match winner" | "1x2" | "full time result" | "match result" => {
                Some(MarketFamily::MatchResult)
            }
            "double chance" => Some(MarketFamily::DoubleChance),
            "both teams score" | "both teams to score" | "btts" => {
                Some(MarketFamily::BothTeamsScore)
            }
            _ => None,
        }
    }

    /// Human-readable market name used in rendered tickets.
    pub fn label(&self) -> &'static str {
        match self {
            MarketFamily::MatchResult => "1X2",
            MarketFamily::DoubleChance => "Double Chance",
            MarketFamily::BothTeamsScore => "Both Teams Score",
            MarketFamily::GoalsOverUnder => "Over/Under",
            MarketFamily::FirstHalfGoals => "Over/Under 1st Half",
            MarketFamily::HomeTeamGoals => "Home Total",
            MarketFamily::AwayTeamGoals => "Away Total",
        }
    }

    /// Fold a raw outcome label into this family's canonical form.
    ///
    /// Canonical labels are fixed points: re-normalizing an already
    /// canonical label returns it unchanged.
    pub fn normalize_outcome(&self, raw: &str) -> String {
        let collapsed = collapse_whitespace(raw);
        let lower = collapsed.to_lowercase();

        match self {
            MarketFamily::MatchResult => match lower.as_str() {
                "1" | "home" => "Home".to_string(),
                "2" | "away" => "Away".to_string(),
                "x" | "draw" => "Draw".to_string(),
                _ => collapsed,
            },
            MarketFamily::DoubleChance => match lower.as_str() {
                "1x" | "home/draw" | "home or draw" => "1X".to_string(),
                "x2" | "draw/away" | "draw or away" => "X2".to_string(),
                "12" | "home/away" | "home or away" => "12".to_string(),
                _ => collapsed,
            },
            MarketFamily::BothTeamsScore => match lower.as_str() {
                "yes" => "Yes".to_string(),
                "no" => "No".to_string(),
                _ => collapsed,
            },
            MarketFamily::GoalsOverUnder
            | MarketFamily::FirstHalfGoals
            | MarketFamily::HomeTeamGoals
            | MarketFamily::AwayTeamGoals => fold_total_label(&lower).unwrap_or(collapsed),
        }
    }
}

impl fmt::Display for MarketFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold "over 2.5" / "over2.5" / "o 2.5" into "Over 2.5" (same for
/// under). Returns `None` when the label is not an over/under form.
fn fold_total_label(lower: &str) -> Option<String> {
    let (word, rest) = if let Some(rest) = lower.strip_prefix("over") {
        ("Over", rest)
    } else if let Some(rest) = lower.strip_prefix("under") {
        ("Under", rest)
    } else if let Some(rest) = lower.strip_prefix('o') {
        ("Over", rest)
    } else if let Some(rest) = lower.strip_prefix('u') {
        ("Under", rest)
    } else {
        return None;
    };

    let line = rest.trim();
    if line.is_empty() || !line.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{word} {line}"))
}

// ---------------------------------------------------------------------------
// Odds tables
// ---------------------------------------------------------------------------

/// Per-fixture canonical odds: market family → outcome label → best
/// (maximum) price observed across all bookmakers.
///
/// Built once per fixture per run; entries are only ever improved, never
/// overwritten with a lower price.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OddsTable {
    markets: BTreeMap<MarketFamily, BTreeMap<String, f64>>,
}

impl OddsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a quoted price for (family, outcome), keeping the maximum.
    /// Non-positive prices are rejected.
    pub fn offer(&mut self, family: MarketFamily, outcome: impl Into<String>, price: f64) {
        if price <= 0.0 {
            return;
        }
        let slot = self
            .markets
            .entry(family)
            .or_default()
            .entry(outcome.into())
            .or_insert(0.0);
        if price > *slot {
            *slot = price;
        }
    }

    /// Best price for an outcome, if quoted.
    pub fn price(&self, family: MarketFamily, outcome: &str) -> Option<f64> {
        self.markets.get(&family)?.get(outcome).copied()
    }

    /// All quoted outcomes for a family.
    pub fn outcomes(&self, family: MarketFamily) -> Option<&BTreeMap<String, f64>> {
        self.markets.get(&family)
    }

    /// Iterate over every (family, outcome, price) entry.
    pub fn entries(&self) -> impl Iterator<Item = (MarketFamily, &str, f64)> {
        self.markets.iter().flat_map(|(family, outcomes)| {
            outcomes.iter().map(|(label, price)| (*family, label.as_str(), *price))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.markets.values().all(|m| m.is_empty())
    }

    /// Number of market families with at least one quoted outcome.
    pub fn market_count(&self) -> usize {
        self.markets.values().filter(|m| !m.is_empty()).count()
    }
}

// ---------------------------------------------------------------------------
// Rules and tiers
// ---------------------------------------------------------------------------

/// Acceptance test for a single (market, outcome) pair.
///
/// Rules are static configuration, not derived from feed data. Bounds
/// are inclusive on both ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MarketRule {
    /// Accept a price inside [min, max].
    Band {
        market: MarketFamily,
        outcome: String,
        min: f64,
        max: f64,
    },
    /// Accept a price at or below `max`.
    Cap {
        market: MarketFamily,
        outcome: String,
        max: f64,
    },
}

impl MarketRule {
    pub fn market(&self) -> MarketFamily {
        match self {
            MarketRule::Band { market, .. } | MarketRule::Cap { market, .. } => *market,
        }
    }

    pub fn outcome(&self) -> &str {
        match self {
            MarketRule::Band { outcome, .. } | MarketRule::Cap { outcome, .. } => outcome,
        }
    }

    /// Whether this rule accepts the given quoted price.
    pub fn accepts(&self, price: f64) -> bool {
        match self {
            MarketRule::Band { min, max, .. } => price >= *min && price <= *max,
            MarketRule::Cap { max, .. } => price <= *max,
        }
    }
}

/// One relaxation tier: a named rule set, optionally restricted to the
/// resolved league scope. Tiers are configured in escalation order, each
/// strictly more permissive than the one before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTier {
    pub name: String,
    /// Restrict candidate fixtures to the resolved `AllowScope`.
    #[serde(default)]
    pub scoped: bool,
    pub rules: Vec<MarketRule>,
}

// ---------------------------------------------------------------------------
// Ticket targets
// ---------------------------------------------------------------------------

/// Ordering objective for the greedy composition pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    /// Clear the target with as few legs as possible (pool ordered by
    /// price descending).
    #[default]
    FewestLegs,
    /// Land close to the target without overshooting on large prices
    /// (pool ordered by price ascending).
    ClosestFit,
}

/// One per-ticket cumulative-price goal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceTarget {
    pub total: f64,
    #[serde(default)]
    pub objective: Objective,
}

// ---------------------------------------------------------------------------
// Legs and tickets
// ---------------------------------------------------------------------------

/// One accepted selection: a fixture bound to its single best-qualifying
/// (market, outcome, price) triple. Price is always > 0.
#[derive(Debug, Clone)]
pub struct Leg {
    pub fixture: Fixture,
    pub market: MarketFamily,
    pub outcome: String,
    pub price: f64,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vs {} — {} → {}: {:.2}",
            self.fixture.home.name, self.fixture.away.name, self.market, self.outcome, self.price,
        )
    }
}

/// A finished combination of legs for one price target.
#[derive(Debug, Clone)]
pub struct Ticket {
    /// 1-based position in the run's output.
    pub index: usize,
    pub legs: Vec<Leg>,
    /// The cumulative-price goal this ticket was assembled for.
    pub target: f64,
    /// Product of leg prices.
    pub total: f64,
}

impl Ticket {
    pub fn new(index: usize, legs: Vec<Leg>, target: f64) -> Self {
        let total = legs.iter().map(|l| l.price).product();
        Self { index, legs, target, total }
    }

    /// Leg count within [min, max], product at or above target, and no
    /// duplicate underlying fixture.
    pub fn is_valid(&self, min_legs: usize, max_legs: usize) -> bool {
        if self.legs.is_empty()
            || self.legs.len() < min_legs
            || self.legs.len() > max_legs
            || self.total < self.target
        {
            return false;
        }
        let mut seen = HashSet::new();
        self.legs.iter().all(|l| seen.insert(l.fixture.id))
    }

    pub fn fixture_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.legs.iter().map(|l| l.fixture.id)
    }
}

// ---------------------------------------------------------------------------
// League scope
// ---------------------------------------------------------------------------

/// Resolved set of league ids used to prioritize or restrict candidate
/// fixtures. Computed once per run, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct AllowScope {
    ids: BTreeSet<u64>,
}

impl AllowScope {
    pub fn from_ids<I: IntoIterator<Item = u64>>(ids: I) -> Self {
        Self { ids: ids.into_iter().collect() }
    }

    pub fn allows(&self, league_id: u64) -> bool {
        self.ids.contains(&league_id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- MarketFamily tests --

    #[test]
    fn test_from_feed_name_canonical_families() {
        assert_eq!(
            MarketFamily::from_feed_name("Match Winner"),
            Some(MarketFamily::MatchResult)
        );
        assert_eq!(MarketFamily::from_feed_name("1X2"), Some(MarketFamily::MatchResult));
        assert_eq!(
            MarketFamily::from_feed_name("Double Chance"),
            Some(MarketFamily::DoubleChance)
        );
        assert_eq!(
            MarketFamily::from_feed_name("Both Teams Score"),
            Some(MarketFamily::BothTeamsScore)
        );
        assert_eq!(
            MarketFamily::from_feed_name("Goals Over/Under"),
            Some(MarketFamily::GoalsOverUnder)
        );
        assert_eq!(
            MarketFamily::from_feed_name("Goals Over/Under First Half"),
            Some(MarketFamily::FirstHalfGoals)
        );
        assert_eq!(
            MarketFamily::from_feed_name("Total - Home"),
            Some(MarketFamily::HomeTeamGoals)
        );
        assert_eq!(
            MarketFamily::from_feed_name("Total - Away"),
            Some(MarketFamily::AwayTeamGoals)
        );
    }

    #[test]
    fn test_from_feed_name_rejects_noise() {
        assert_eq!(MarketFamily::from_feed_name("Asian Handicap"), None);
        assert_eq!(MarketFamily::from_feed_name("Corners Over/Under"), None);
        assert_eq!(MarketFamily::from_feed_name("Cards Over/Under"), None);
        assert_eq!(MarketFamily::from_feed_name("Penalty Shootout Winner"), None);
        assert_eq!(MarketFamily::from_feed_name("Anytime Goal Scorer"), None);
        // Noise wins even when the name superficially matches a family.
        assert_eq!(MarketFamily::from_feed_name("Handicap Result 1X2"), None);
    }

    #[test]
    fn test_from_feed_name_unrecognized() {
        assert_eq!(MarketFamily::from_feed_name("Exact Score"), None);
        assert_eq!(MarketFamily::from_feed_name("Odd/Even"), None);
        assert_eq!(MarketFamily::from_feed_name(""), None);
    }

    #[test]
    fn test_normalize_outcome_match_result() {
        let m = MarketFamily::MatchResult;
        assert_eq!(m.normalize_outcome("1"), "Home");
        assert_eq!(m.normalize_outcome("2"), "Away");
        assert_eq!(m.normalize_outcome("X"), "Draw");
        assert_eq!(m.normalize_outcome("home"), "Home");
    }

    #[test]
    fn test_normalize_outcome_double_chance() {
        let m = MarketFamily::DoubleChance;
        assert_eq!(m.normalize_outcome("Home/Draw"), "1X");
        assert_eq!(m.normalize_outcome("Draw/Away"), "X2");
        assert_eq!(m.normalize_outcome("Home/Away"), "12");
        assert_eq!(m.normalize_outcome("1X"), "1X");
    }

    #[test]
    fn test_normalize_outcome_totals() {
        let m = MarketFamily::GoalsOverUnder;
        assert_eq!(m.normalize_outcome("over2.5"), "Over 2.5");
        assert_eq!(m.normalize_outcome("Under  1.5"), "Under 1.5");
        assert_eq!(m.normalize_outcome("O 0.5"), "Over 0.5");
        assert_eq!(m.normalize_outcome("u3.5"), "Under 3.5");
    }

    #[test]
    fn test_normalize_outcome_is_idempotent() {
        for (family, label) in [
            (MarketFamily::MatchResult, "Home"),
            (MarketFamily::DoubleChance, "1X"),
            (MarketFamily::BothTeamsScore, "Yes"),
            (MarketFamily::GoalsOverUnder, "Over 2.5"),
            (MarketFamily::FirstHalfGoals, "Under 1.5"),
        ] {
            let once = family.normalize_outcome(label);
            assert_eq!(once, label);
            assert_eq!(family.normalize_outcome(&once), once);
        }
    }

    // -- OddsTable tests --

    #[test]
    fn test_offer_retains_maximum() {
        let mut table = OddsTable::new();
        for price in [1.40, 1.55, 1.30] {
            table.offer(MarketFamily::DoubleChance, "1X", price);
        }
        assert_eq!(table.price(MarketFamily::DoubleChance, "1X"), Some(1.55));
    }

    #[test]
    fn test_offer_never_lowers() {
        let mut table = OddsTable::new();
        table.offer(MarketFamily::MatchResult, "Home", 1.80);
        table.offer(MarketFamily::MatchResult, "Home", 1.20);
        assert_eq!(table.price(MarketFamily::MatchResult, "Home"), Some(1.80));
    }

    #[test]
    fn test_offer_rejects_non_positive() {
        let mut table = OddsTable::new();
        table.offer(MarketFamily::MatchResult, "Home", 0.0);
        table.offer(MarketFamily::MatchResult, "Home", -1.5);
        assert!(table.is_empty());
        assert_eq!(table.price(MarketFamily::MatchResult, "Home"), None);
    }

    #[test]
    fn test_entries_iteration() {
        let mut table = OddsTable::new();
        table.offer(MarketFamily::MatchResult, "Home", 1.50);
        table.offer(MarketFamily::DoubleChance, "1X", 1.25);
        let entries: Vec<_> = table.entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(table.market_count(), 2);
    }

    // -- MarketRule tests --

    #[test]
    fn test_band_rule_inclusive_bounds() {
        let rule = MarketRule::Band {
            market: MarketFamily::DoubleChance,
            outcome: "1X".to_string(),
            min: 1.20,
            max: 1.45,
        };
        assert!(rule.accepts(1.20));
        assert!(rule.accepts(1.30));
        assert!(rule.accepts(1.45));
        assert!(!rule.accepts(1.19));
        assert!(!rule.accepts(1.46));
    }

    #[test]
    fn test_cap_rule_inclusive_bound() {
        let rule = MarketRule::Cap {
            market: MarketFamily::MatchResult,
            outcome: "Home".to_string(),
            max: 1.45,
        };
        assert!(rule.accepts(1.45));
        assert!(rule.accepts(1.01));
        assert!(!rule.accepts(1.46));
    }

    #[test]
    fn test_rule_toml_roundtrip() {
        let toml_src = r#"
            kind = "band"
            market = "double-chance"
            outcome = "1X"
            min = 1.2
            max = 1.45
        "#;
        let rule: MarketRule = toml::from_str(toml_src).unwrap();
        assert_eq!(rule.market(), MarketFamily::DoubleChance);
        assert_eq!(rule.outcome(), "1X");
        assert!(rule.accepts(1.3));
    }

    // -- Ticket tests --

    #[test]
    fn test_ticket_total_is_product() {
        let legs: Vec<Leg> = [(1, 1.50), (2, 2.00)]
            .into_iter()
            .map(|(id, price)| Leg {
                fixture: Fixture::sample(id),
                market: MarketFamily::MatchResult,
                outcome: "Home".to_string(),
                price,
            })
            .collect();
        let ticket = Ticket::new(1, legs, 2.5);
        assert!((ticket.total - 3.0).abs() < 1e-9);
        assert!(ticket.is_valid(2, 6));
    }

    #[test]
    fn test_ticket_duplicate_fixture_invalid() {
        let legs: Vec<Leg> = (0..2)
            .map(|_| Leg {
                fixture: Fixture::sample(7),
                market: MarketFamily::MatchResult,
                outcome: "Home".to_string(),
                price: 2.0,
            })
            .collect();
        let ticket = Ticket::new(1, legs, 3.0);
        assert!(!ticket.is_valid(2, 6));
    }

    #[test]
    fn test_ticket_below_target_invalid() {
        let legs = vec![Leg {
            fixture: Fixture::sample(1),
            market: MarketFamily::MatchResult,
            outcome: "Home".to_string(),
            price: 1.50,
        }];
        let ticket = Ticket::new(1, legs, 2.0);
        assert!(!ticket.is_valid(1, 6));
    }

    // -- AllowScope tests --

    #[test]
    fn test_allow_scope() {
        let scope = AllowScope::from_ids([39, 140, 135]);
        assert!(scope.allows(39));
        assert!(!scope.allows(61));
        assert_eq!(scope.len(), 3);
        assert!(!scope.is_empty());
        assert!(AllowScope::default().is_empty());
    }
}
