//! Ticket text rendering.
//!
//! Produces the human-readable artifact handed to delivery
//! collaborators (chat, spreadsheet backends). They treat this text as
//! opaque content, so the layout here is the external contract: per leg
//! the league, fixture id, teams, kickoff and chosen selection, then a
//! trailing cumulative-odds summary. Kickoff times are rendered in UTC;
//! localization belongs to the delivery side.

use crate::types::{Leg, Ticket};

/// One leg as a multi-line block.
pub fn render_leg(leg: &Leg) -> String {
    let league = league_line(&leg.fixture.league.country, &leg.fixture.league.name);
    format!(
        "🏟 {league}\n\
         🆔 {id}\n\
         ⚽ {home} vs {away}\n\
         ⏰ {kickoff}\n\
         • {market} → {outcome}: {price:.2}",
        id = leg.fixture.id,
        home = leg.fixture.home.name,
        away = leg.fixture.away.name,
        kickoff = leg.fixture.kickoff.format("%Y-%m-%d %H:%M"),
        market = leg.market,
        outcome = leg.outcome,
        price = leg.price,
    )
}

/// A full ticket: leg blocks separated by blank lines plus the
/// cumulative-odds line.
pub fn render_ticket(ticket: &Ticket) -> String {
    let body: Vec<String> = ticket.legs.iter().map(render_leg).collect();
    let factors: Vec<String> = ticket.legs.iter().map(|l| format!("{:.2}", l.price)).collect();
    format!(
        "{}\n\nTOTAL ODDS: {} = {:.2}",
        body.join("\n\n"),
        factors.join(" × "),
        ticket.total,
    )
}

fn league_line(country: &str, name: &str) -> String {
    match (country.is_empty(), name.is_empty()) {
        (true, true) => String::new(),
        (true, false) => name.to_string(),
        (false, true) => country.to_string(),
        (false, false) => format!("{country} — {name}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
