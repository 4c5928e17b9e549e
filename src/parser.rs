//! Free-text show requests, e.g. `"tomorrow two blueie and one peppa"`.
//!
//! Parsing is deliberately simple: a day keyword, clauses split on `" and "`
//! or `,`, an optional leading count, and a series keyword resolved through the
//! configured nicknames, then an exact library match, then fuzzy matching.

use crate::config::Settings;
use crate::models::{RequestItem, RequestPayload};
use crate::store::Store;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Minimum similarity for a fuzzy series match.
pub const FUZZY_CUTOFF: f64 = 0.6;

lazy_static::lazy_static! {
    static ref NUMBER_WORDS: HashMap<&'static str, u32> = [
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
    ]
    .into_iter()
    .collect();
}

/// Result of parsing one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRequest {
    /// 0 for today, 1 for tomorrow.
    pub day_offset: i64,
    pub requests: Vec<RequestItem>,
}

impl ParsedRequest {
    /// The date this request is for, counted from `today`.
    #[must_use]
    pub fn target_date(&self, today: NaiveDate) -> NaiveDate {
        today + Duration::days(self.day_offset)
    }

    #[must_use]
    pub fn payload(&self) -> RequestPayload {
        RequestPayload::from(self.requests.clone())
    }
}

/// Split a leading count off a clause: `"two throw throw"` -> `(2, "throw throw")`.
fn split_count(clause: &str) -> (Option<u32>, String) {
    let words: Vec<&str> = clause.split_whitespace().collect();
    let Some(first) = words.first() else {
        return (None, String::new());
    };

    let count = NUMBER_WORDS.get(*first).copied().or_else(|| {
        if !first.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        // Any digit run is a count; ones too large for u32 saturate.
        Some(first.parse().unwrap_or_else(|_| {
            warn!("Count {first} is out of range, using {}", u32::MAX);
            u32::MAX
        }))
    });

    match count {
        Some(count) => (Some(count), words[1..].join(" ")),
        None => (None, words.join(" ")),
    }
}

/// Similarity of two lowercase names in `[0, 1]`.
///
/// The better of normalized Levenshtein, which tolerates a typo in a short
/// name (`"bluy"` vs `"bluey"`), and the Sørensen–Dice bigram ratio, which
/// tolerates a dropped word (`"peppa"` vs `"peppa pig"`).
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b).max(strsim::sorensen_dice(a, b))
}

/// Best fuzzy match of `keyword` among `candidates`, compared lowercase.
///
/// The earliest candidate wins ties.
#[must_use]
pub fn closest_match<'c>(keyword: &str, candidates: &'c [String], cutoff: f64) -> Option<&'c str> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = similarity(keyword, &candidate.to_lowercase());
        if score >= cutoff && best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate.as_str(), score));
        }
    }
    best.map(|(name, score)| {
        debug!("Fuzzy matched {keyword:?} to {name:?} ({score:.2})");
        name
    })
}

/// Turns free text into `(day offset, requests)` against the library's series.
pub struct RequestParser<'a, S: Store + ?Sized> {
    store: &'a S,
    keyword_map: &'a BTreeMap<String, String>,
}

impl<'a, S: Store + ?Sized> RequestParser<'a, S> {
    pub fn new(store: &'a S, settings: &'a Settings) -> Self {
        Self { store, keyword_map: &settings.keyword_map }
    }

    /// Unresolvable clauses are dropped with a warning; store errors propagate.
    pub fn parse(&self, text: &str) -> Result<ParsedRequest> {
        let mut text = text.to_lowercase();
        let mut day_offset = 0;

        if text.contains("tomorrow") {
            day_offset = 1;
            text = text.replace("tomorrow", "");
        }
        if text.contains("today") {
            day_offset = 0;
            text = text.replace("today", "");
        }

        // Loaded on first use, once per parse.
        let mut library: Option<Vec<String>> = None;
        let mut requests = Vec::new();

        for clause in text.split(',').flat_map(|part| part.split(" and ")) {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }

            let (count, keyword) = split_count(clause);
            let count = count.unwrap_or(1);
            if keyword.is_empty() {
                warn!("No series named in request clause {clause:?}");
                continue;
            }
            if count == 0 {
                warn!("Ignoring request for zero episodes of {keyword:?}");
                continue;
            }

            if library.is_none() && !self.keyword_map.contains_key(&keyword) {
                library = Some(self.store.list_series()?);
            }
            let series = self.resolve_series(&keyword, library.as_deref().unwrap_or_default());

            match series {
                Some(series) => requests.push(RequestItem { series, count }),
                None => warn!("Could not resolve series for keyword: {keyword}"),
            }
        }

        Ok(ParsedRequest { day_offset, requests })
    }

    fn resolve_series(&self, keyword: &str, library: &[String]) -> Option<String> {
        if let Some(series) = self.keyword_map.get(keyword).or_else(|| {
            self.keyword_map
                .iter()
                .find(|(alias, _)| alias.to_lowercase() == keyword)
                .map(|(_, series)| series)
        }) {
            return Some(series.clone());
        }

        if let Some(series) = library.iter().find(|s| s.to_lowercase() == keyword) {
            return Some(series.clone());
        }

        closest_match(keyword, library, FUZZY_CUTOFF).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_count_variants() {
        assert_eq!(split_count("two throw throw"), (Some(2), "throw throw".to_string()));
        assert_eq!(split_count("12 bluey"), (Some(12), "bluey".to_string()));
        assert_eq!(split_count("bluey"), (None, "bluey".to_string()));
        assert_eq!(split_count("ten"), (Some(10), String::new()));
        assert_eq!(split_count("  peppa   pig "), (None, "peppa pig".to_string()));
    }

    #[test]
    fn test_split_count_saturates_huge_numbers() {
        assert_eq!(split_count("4294967296 bluey"), (Some(u32::MAX), "bluey".to_string()));
        assert_eq!(
            split_count("99999999999999999999999 peppa pig"),
            (Some(u32::MAX), "peppa pig".to_string())
        );
    }

    #[test]
    fn test_closest_match_tolerates_typo_in_short_name() {
        let library = vec![
            "Bluey".to_string(),
            "Peppa Pig".to_string(),
            "Paw Patrol".to_string(),
        ];
        assert_eq!(closest_match("bluy", &library, FUZZY_CUTOFF), Some("Bluey"));
        assert_eq!(closest_match("pepa pig", &library, FUZZY_CUTOFF), Some("Peppa Pig"));
        assert_eq!(closest_match("dinosaurs", &library, FUZZY_CUTOFF), None);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("bluey", "bluey"), 1.0);
        assert!((similarity("bluy", "bluey") - 0.8).abs() < 1e-12);
        assert!(similarity("peppa", "peppa pig") >= FUZZY_CUTOFF);
        assert!(similarity("xyz", "bluey") < FUZZY_CUTOFF);
    }

    #[test]
    fn test_closest_match_prefers_best_score() {
        let library = vec![
            "Bluey".to_string(),
            "Throw_Throw_Burrito".to_string(),
            "Peppa Pig".to_string(),
        ];
        assert_eq!(closest_match("peppa", &library, FUZZY_CUTOFF), Some("Peppa Pig"));
        assert_eq!(closest_match("unknown_show", &library, FUZZY_CUTOFF), None);
    }

    #[test]
    fn test_target_date_uses_offset() {
        let parsed = ParsedRequest { day_offset: 1, requests: Vec::new() };
        let today = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(parsed.target_date(today), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }
}
