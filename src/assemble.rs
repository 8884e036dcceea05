//! Ticket assembly — the constraint engine.
//!
//! For each configured price target the assembler generates candidate
//! legs (at most one per fixture: the highest-priced outcome any rule
//! accepts), escalating through relaxation tiers until a tier's pool
//! can produce a valid ticket, then composes legs greedily until the
//! leg-count and cumulative-price constraints hold.
//!
//! Composition is two-phase: the ordered candidate list is built first,
//! then a pure selection pass returns a fresh leg vector — nothing is
//! popped or re-sorted mid-loop. Fixtures consumed by an emitted ticket
//! are excluded from every later target in the same run.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::types::{
    AllowScope, Fixture, Leg, MarketRule, Objective, OddsTable, PriceTarget, RuleTier, Ticket,
};

// ---------------------------------------------------------------------------
// Candidate generation
// ---------------------------------------------------------------------------

/// The single best-qualifying leg for one fixture under a rule set.
///
/// Every rule is evaluated against the fixture's odds table; among all
/// accepted outcomes the highest-priced one wins. A price tie keeps the
/// earliest rule in the list. No accepted outcome → no candidate.
pub fn best_candidate(fixture: &Fixture, table: &OddsTable, rules: &[MarketRule]) -> Option<Leg> {
    let mut best: Option<(f64, &MarketRule)> = None;
    for rule in rules {
        let Some(price) = table.price(rule.market(), rule.outcome()) else {
            continue;
        };
        if !rule.accepts(price) {
            continue;
        }
        if best.map_or(true, |(held, _)| price > held) {
            best = Some((price, rule));
        }
    }
    best.map(|(price, rule)| Leg {
        fixture: fixture.clone(),
        market: rule.market(),
        outcome: rule.outcome().to_string(),
        price,
    })
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Select legs from a candidate pool to satisfy one target.
///
/// The pool is ordered by price — descending for `FewestLegs`,
/// ascending for `ClosestFit` — and accumulated until the leg count is
/// at least `min_legs` and the running product reaches the target, or
/// `max_legs` is hit. If the target is still unmet, a corrective pass
/// scans the remainder in the opposite ordering, adding or substituting
/// legs. A final trim pass drops the lowest-priced legs whose removal
/// keeps the selection valid (fewest legs, then smallest overshoot).
///
/// Returns `None` when no valid selection exists from this pool.
pub fn compose(
    pool: &[Leg],
    target: PriceTarget,
    min_legs: usize,
    max_legs: usize,
) -> Option<Vec<Leg>> {
    if pool.len() < min_legs || min_legs == 0 || max_legs < min_legs {
        return None;
    }

    let mut ordered: Vec<&Leg> = pool.iter().collect();
    ordered.sort_by(|a, b| {
        let cmp = a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal);
        match target.objective {
            Objective::FewestLegs => cmp.reverse(),
            Objective::ClosestFit => cmp,
        }
    });

    // Phase 1: greedy accumulation over the ordered pool.
    let mut selected: Vec<&Leg> = Vec::new();
    let mut product = 1.0;
    for &leg in &ordered {
        if selected.len() >= min_legs && product >= target.total {
            break;
        }
        if selected.len() == max_legs {
            break;
        }
        selected.push(leg);
        product *= leg.price;
    }

    // Phase 2: corrective pass in the opposite ordering when the greedy
    // walk ran out of room before reaching the target.
    if selected.len() < min_legs || product < target.total {
        let chosen: HashSet<u64> = selected.iter().map(|l| l.fixture.id).collect();
        let remainder = ordered
            .iter()
            .rev()
            .copied()
            .filter(|l| !chosen.contains(&l.fixture.id));

        for cand in remainder {
            if selected.len() < max_legs {
                selected.push(cand);
                product *= cand.price;
            } else {
                let (idx, weakest) = selected
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal)
                    })
                    .map(|(i, l)| (i, l.price))?;
                if cand.price <= weakest {
                    continue;
                }
                product = product / weakest * cand.price;
                selected[idx] = cand;
            }
            if selected.len() >= min_legs && product >= target.total {
                break;
            }
        }
    }

    if selected.len() < min_legs || product < target.total {
        return None;
    }

    // Trim: drop the weakest legs while the selection stays valid.
    while selected.len() > min_legs {
        let (idx, weakest) = selected
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal))
            .map(|(i, l)| (i, l.price))?;
        if product / weakest < target.total {
            break;
        }
        product /= weakest;
        selected.remove(idx);
    }

    Some(selected.into_iter().cloned().collect())
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Runs the full tiering → composition state machine for an ordered
/// list of price targets.
pub struct Assembler<'a> {
    tiers: &'a [RuleTier],
    scope: &'a AllowScope,
    min_legs: usize,
    max_legs: usize,
}

impl<'a> Assembler<'a> {
    pub fn new(
        tiers: &'a [RuleTier],
        scope: &'a AllowScope,
        min_legs: usize,
        max_legs: usize,
    ) -> Self {
        Self { tiers, scope, min_legs, max_legs }
    }

    /// Assemble tickets for every target in order.
    ///
    /// A target for which no tier yields a valid ticket is skipped —
    /// that is a normal outcome, not an error. Fixtures consumed by an
    /// emitted ticket never reappear in a later target's pool.
    pub fn assemble(
        &self,
        fixtures: &[Fixture],
        odds: &HashMap<u64, OddsTable>,
        targets: &[PriceTarget],
    ) -> Vec<Ticket> {
        let mut consumed: HashSet<u64> = HashSet::new();
        let mut tickets: Vec<Ticket> = Vec::new();

        for target in targets {
            match self.assemble_one(fixtures, odds, &consumed, *target) {
                Some(legs) => {
                    let ticket = Ticket::new(tickets.len() + 1, legs, target.total);
                    info!(
                        ticket = ticket.index,
                        legs = ticket.legs.len(),
                        total = format!("{:.2}", ticket.total),
                        target = format!("{:.2}", target.total),
                        "Ticket assembled"
                    );
                    consumed.extend(ticket.fixture_ids());
                    tickets.push(ticket);
                }
                None => {
                    info!(
                        target = format!("{:.2}", target.total),
                        "No tier yielded enough qualifying legs, skipping target"
                    );
                }
            }
        }

        tickets
    }

    /// One target: escalate through the tiers until one composes a
    /// valid leg set.
    fn assemble_one(
        &self,
        fixtures: &[Fixture],
        odds: &HashMap<u64, OddsTable>,
        consumed: &HashSet<u64>,
        target: PriceTarget,
    ) -> Option<Vec<Leg>> {
        for tier in self.tiers {
            let pool = self.candidates(fixtures, odds, consumed, tier);
            if pool.len() < self.min_legs {
                debug!(
                    tier = %tier.name,
                    pool = pool.len(),
                    min_legs = self.min_legs,
                    "Tier pool below minimum leg count, escalating"
                );
                continue;
            }
            if let Some(legs) = compose(&pool, target, self.min_legs, self.max_legs) {
                debug!(tier = %tier.name, legs = legs.len(), "Tier satisfied target");
                return Some(legs);
            }
            debug!(tier = %tier.name, pool = pool.len(), "Tier pool could not reach target, escalating");
        }
        None
    }

    /// Candidate legs for one tier: unconsumed fixtures, scope-checked
    /// when the tier is scoped, one best-qualifying leg each.
    fn candidates(
        &self,
        fixtures: &[Fixture],
        odds: &HashMap<u64, OddsTable>,
        consumed: &HashSet<u64>,
        tier: &RuleTier,
    ) -> Vec<Leg> {
        let mut pool = Vec::new();
        for fixture in fixtures {
            if consumed.contains(&fixture.id) {
                continue;
            }
            if tier.scoped && !self.scope.is_empty() && !self.scope.allows(fixture.league.id) {
                continue;
            }
            let Some(table) = odds.get(&fixture.id) else {
                continue;
            };
            if let Some(leg) = best_candidate(fixture, table, &tier.rules) {
                pool.push(leg);
            }
        }
        pool
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
