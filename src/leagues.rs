//! League scope resolution.
//!
//! Turns the configured (country, league-name) preferences into a
//! concrete set of league ids via the feed's search endpoint, then
//! unions in the static fallback ids. The result is computed once per
//! run and treated as read-only by everything downstream.

use tracing::{debug, info, warn};

use crate::config::LeaguePreference;
use crate::feed::{FeedError, LeagueHit, OddsFeed};
use crate::types::AllowScope;

/// Whether a search hit satisfies a preference: the season must be
/// current and the country must match. The upstream files international
/// competitions under country "World", which matches any preference.
fn hit_matches(hit: &LeagueHit, pref: &LeaguePreference) -> bool {
    hit.current_season
        && (hit.country.eq_ignore_ascii_case(&pref.country)
            || hit.country.eq_ignore_ascii_case("world"))
}

/// Resolve the run's league scope.
///
/// A preference that resolves to zero leagues is logged and skipped —
/// the fallback set keeps the run usable when upstream naming drifts.
/// Search failures for one preference likewise do not abort resolution.
pub async fn resolve_scope(
    feed: &dyn OddsFeed,
    preferred: &[LeaguePreference],
    fallback_ids: &[u64],
) -> Result<AllowScope, FeedError> {
    let mut ids: Vec<u64> = fallback_ids.to_vec();

    for pref in preferred {
        let hits = match feed.search_leagues(&pref.name).await {
            Ok(hits) => hits,
            Err(e) if e.is_upstream() => {
                warn!(
                    country = %pref.country,
                    league = %pref.name,
                    error = %e,
                    "League search rejected upstream, relying on fallback ids"
                );
                continue;
            }
            Err(e) => return Err(e),
        };

        let matched: Vec<u64> = hits
            .iter()
            .filter(|h| hit_matches(h, pref))
            .map(|h| h.id)
            .collect();

        if matched.is_empty() {
            warn!(
                country = %pref.country,
                league = %pref.name,
                hits = hits.len(),
                "League preference resolved to zero leagues"
            );
        } else {
            debug!(
                country = %pref.country,
                league = %pref.name,
                ids = ?matched,
                "League preference resolved"
            );
            ids.extend(matched);
        }
    }

    let scope = AllowScope::from_ids(ids);
    info!(
        leagues = scope.len(),
        preferences = preferred.len(),
        fallback = fallback_ids.len(),
        "League scope resolved"
    );
    Ok(scope)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MockOddsFeed;

    fn hit(id: u64, name: &str, country: &str, current: bool) -> LeagueHit {
        LeagueHit {
            id,
            name: name.to_string(),
            country: country.to_string(),
            current_season: current,
        }
    }

    fn pref(country: &str, name: &str) -> LeaguePreference {
        LeaguePreference { country: country.to_string(), name: name.to_string() }
    }

    #[tokio::test]
    async fn test_resolves_current_season_matching_country() {
        let mut feed = MockOddsFeed::new();
        feed.expect_search_leagues().returning(|_| {
            Ok(vec![
                hit(39, "Premier League", "England", true),
                hit(900, "Premier League", "Ghana", true),
                hit(901, "Premier League", "England", false),
            ])
        });

        let scope = resolve_scope(&feed, &[pref("England", "Premier League")], &[])
            .await
            .unwrap();
        assert!(scope.allows(39));
        assert!(!scope.allows(900)); // wrong country
        assert!(!scope.allows(901)); // season not current
    }

    #[tokio::test]
    async fn test_world_country_matches_any_preference() {
        let mut feed = MockOddsFeed::new();
        feed.expect_search_leagues()
            .returning(|_| Ok(vec![hit(2, "UEFA Champions League", "World", true)]));

        let scope = resolve_scope(&feed, &[pref("Europe", "Champions League")], &[])
            .await
            .unwrap();
        assert!(scope.allows(2));
    }

    #[tokio::test]
    async fn test_zero_hit_preference_does_not_fail() {
        let mut feed = MockOddsFeed::new();
        feed.expect_search_leagues().returning(|_| Ok(vec![]));

        let scope = resolve_scope(&feed, &[pref("England", "Premiere Leage")], &[39, 140])
            .await
            .unwrap();
        // Fallback ids survive a failed search.
        assert_eq!(scope.len(), 2);
        assert!(scope.allows(39));
        assert!(scope.allows(140));
    }

    #[tokio::test]
    async fn test_fallback_unioned_with_resolved() {
        let mut feed = MockOddsFeed::new();
        feed.expect_search_leagues()
            .returning(|_| Ok(vec![hit(135, "Serie A", "Italy", true)]));

        let scope = resolve_scope(&feed, &[pref("Italy", "Serie A")], &[135, 78])
            .await
            .unwrap();
        assert_eq!(scope.len(), 2); // 135 deduplicated
        assert!(scope.allows(78));
    }
}
