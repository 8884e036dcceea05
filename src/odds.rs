//! Odds normalization.
//!
//! The provider serves bookmaker odds in two structurally different
//! shapes depending on endpoint generation: `bookmakers → bets →
//! values` and `bookmakers → markets → outcomes`. Both fold into the
//! same canonical `OddsTable`: market family → outcome label → best
//! (maximum) price across every bookmaker entry seen.
//!
//! Market names are passed through the closed allow-mapping in
//! `MarketFamily::from_feed_name`, which also drops side-market noise
//! (handicaps, corners, cards…). A fixture whose payload contains zero
//! parsable markets yields an empty table, never an error.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{MarketFamily, OddsTable};

/// Normalize the odds entries for a single fixture.
pub fn normalize_fixture_odds(entries: &[Value]) -> OddsTable {
    let mut table = OddsTable::new();
    for entry in entries {
        fold_entry(entry, &mut table);
    }
    table
}

/// Normalize a date-scoped bulk payload into per-fixture tables.
///
/// Entries without a readable fixture id are skipped.
pub fn normalize_daily_odds(entries: &[Value]) -> HashMap<u64, OddsTable> {
    let mut tables: HashMap<u64, OddsTable> = HashMap::new();
    for entry in entries {
        let Some(fixture_id) = entry
            .get("fixture")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_u64)
        else {
            debug!("Skipping daily odds entry without fixture id");
            continue;
        };
        fold_entry(entry, tables.entry(fixture_id).or_default());
    }
    tables
}

/// Fold one response entry's bookmakers into the table.
fn fold_entry(entry: &Value, table: &mut OddsTable) {
    let Some(bookmakers) = entry.get("bookmakers").and_then(Value::as_array) else {
        return;
    };

    for bookmaker in bookmakers {
        // Older payloads nest bet groups under "bets", newer ones under
        // "markets"; the per-outcome arrays differ the same way.
        let Some(markets) = bookmaker
            .get("bets")
            .or_else(|| bookmaker.get("markets"))
            .and_then(Value::as_array)
        else {
            continue;
        };

        for market in markets {
            let raw_name = market
                .get("name")
                .or_else(|| market.get("key"))
                .and_then(Value::as_str)
                .unwrap_or("");
            let Some(family) = MarketFamily::from_feed_name(raw_name) else {
                continue;
            };

            let Some(quotes) = market
                .get("values")
                .or_else(|| market.get("outcomes"))
                .and_then(Value::as_array)
            else {
                continue;
            };

            for quote in quotes {
                let Some(label) = quote_label(quote) else { continue };
                let Some(price) = quote_price(quote) else { continue };
                table.offer(family, family.normalize_outcome(&label), price);
            }
        }
    }
}

/// Outcome label under whichever key this payload generation uses.
fn quote_label(quote: &Value) -> Option<String> {
    for key in ["value", "name", "label"] {
        match quote.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Price under "odd" (string or number) or "price" (number).
/// Non-positive and unparsable prices are dropped.
fn quote_price(quote: &Value) -> Option<f64> {
    let raw = quote.get("odd").or_else(|| quote.get("price"))?;
    let price = match raw {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (price > 0.0).then_some(price)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
