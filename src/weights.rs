//! Episode selection weights from feedback and play history.
//!
//! ```text
//! weight = 0                                   if any NEVER rating
//!        = 1.0
//!          + Σ 0.5 · 0.5^(days_since_like / 7)  for every LIKED rating
//!          + min((days_since_play − 14) / 100, 0.5)
//!                                              if last completed play > 14 days ago
//! ```
//!
//! OKAY ratings leave the weight alone. Elapsed time is counted in whole days.

use crate::models::Rating;
use crate::store::Store;
use anyhow::Result;
use chrono::NaiveDateTime;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

pub const BASELINE_WEIGHT: f64 = 1.0;
pub const LIKED_BONUS: f64 = 0.5;
pub const DECAY_HALF_LIFE_DAYS: f64 = 7.0;
pub const NEVER_AGAIN_WEIGHT: f64 = 0.0;
/// Days without a completed play before the freshness boost starts.
pub const FRESHNESS_THRESHOLD_DAYS: i64 = 14;
/// Boost gained per day past the threshold is `1 / FRESHNESS_SLOPE`.
pub const FRESHNESS_SLOPE: f64 = 100.0;
pub const FRESHNESS_CAP: f64 = 0.5;

/// Everything the weight of one video depends on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightHistory {
    pub feedback: Vec<(Rating, NaiveDateTime)>,
    pub last_completed_play: Option<NaiveDateTime>,
}

/// Whole days from `from` to `to`, never negative.
fn whole_days(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_days().max(0)
}

/// Bonus a single LIKED rating still carries after `days`.
#[must_use]
pub fn liked_bonus(days: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let half_lives = days as f64 / DECAY_HALF_LIFE_DAYS;
    LIKED_BONUS * 0.5_f64.powf(half_lives)
}

/// Boost for an episode whose last completed play was `days` ago.
#[must_use]
pub fn freshness_boost(days: i64) -> f64 {
    if days <= FRESHNESS_THRESHOLD_DAYS {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let boost = (days - FRESHNESS_THRESHOLD_DAYS) as f64 / FRESHNESS_SLOPE;
    boost.min(FRESHNESS_CAP)
}

/// Pure weight formula, independent of any store.
#[must_use]
pub fn weight_from_history(history: &WeightHistory, as_of: NaiveDateTime) -> f64 {
    if history.feedback.iter().any(|(rating, _)| *rating == Rating::Never) {
        return NEVER_AGAIN_WEIGHT;
    }

    let liked: f64 = history
        .feedback
        .iter()
        .filter(|(rating, _)| *rating == Rating::Liked)
        .map(|(_, submitted_at)| liked_bonus(whole_days(*submitted_at, as_of)))
        .sum();

    let fresh = history
        .last_completed_play
        .map_or(0.0, |played| freshness_boost(whole_days(played, as_of)));

    (BASELINE_WEIGHT + liked + fresh).max(0.0)
}

/// Summary of a set of weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeightDistribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; 0 for fewer than two values.
    pub stddev: f64,
}

impl WeightDistribution {
    #[must_use]
    pub fn from_weights(weights: &[f64]) -> Self {
        if weights.is_empty() {
            return Self::default();
        }

        #[allow(clippy::cast_precision_loss)]
        let n = weights.len() as f64;
        let mean = weights.iter().sum::<f64>() / n;
        let stddev = if weights.len() > 1 {
            let variance = weights.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        } else {
            0.0
        };

        Self {
            min: weights.iter().copied().fold(f64::INFINITY, f64::min),
            max: weights.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            stddev,
        }
    }
}

/// Computes weights on demand from the store. Holds no state of its own.
pub struct WeightCalculator<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> WeightCalculator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    fn history(&self, video_id: i64) -> Result<WeightHistory> {
        Ok(WeightHistory {
            feedback: self.store.feedback_for_video(video_id)?,
            last_completed_play: self.store.last_completed_play(video_id)?,
        })
    }

    pub fn calculate_weight(&self, video_id: i64, as_of: NaiveDateTime) -> Result<f64> {
        let weight = weight_from_history(&self.history(video_id)?, as_of);
        debug!("Video {video_id}: weight {weight:.3}");
        Ok(weight)
    }

    /// Weights for many videos, each consistent as of `as_of`.
    pub fn calculate_weights_batch(
        &self,
        video_ids: &[i64],
        as_of: NaiveDateTime,
    ) -> Result<HashMap<i64, f64>> {
        let histories = video_ids
            .iter()
            .map(|&id| Ok((id, self.history(id)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(histories
            .par_iter()
            .map(|(id, history)| (*id, weight_from_history(history, as_of)))
            .collect())
    }

    /// Called by the feedback collaborator after a rating is stored.
    ///
    /// Weights are computed on demand, so there is nothing to refresh yet.
    pub fn update_weight_for_feedback(&self, video_id: i64) {
        info!("Weight update triggered for video {video_id}");
    }

    pub fn get_weight_distribution(
        &self,
        video_ids: &[i64],
        as_of: NaiveDateTime,
    ) -> Result<WeightDistribution> {
        let weights: Vec<f64> = self
            .calculate_weights_batch(video_ids, as_of)?
            .into_values()
            .collect();
        Ok(WeightDistribution::from_weights(&weights))
    }

    /// Enabled videos with weight at least `min_weight`, highest first.
    /// Equal weights keep id order.
    pub fn get_top_weighted_videos(
        &self,
        limit: usize,
        min_weight: f64,
        as_of: NaiveDateTime,
    ) -> Result<Vec<(i64, f64)>> {
        let ids: Vec<i64> = self.store.list_videos(false)?.iter().map(|v| v.id).collect();
        let weights = self.calculate_weights_batch(&ids, as_of)?;

        let mut ranked: Vec<(i64, f64)> = ids
            .into_iter()
            .filter_map(|id| weights.get(&id).map(|&w| (id, w)))
            .filter(|&(_, w)| w >= min_weight)
            .collect();
        ranked.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn noon(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_baseline_without_history() {
        let weight = weight_from_history(&WeightHistory::default(), noon(2025, 11, 13));
        assert_eq!(weight, BASELINE_WEIGHT);
    }

    #[test]
    fn test_never_overrides_everything() {
        let as_of = noon(2025, 11, 13);
        let history = WeightHistory {
            feedback: vec![
                (Rating::Liked, as_of),
                (Rating::Liked, as_of),
                (Rating::Never, as_of - Duration::days(300)),
            ],
            last_completed_play: Some(as_of - Duration::days(400)),
        };
        assert_eq!(weight_from_history(&history, as_of), 0.0);
    }

    #[test]
    fn test_liked_bonus_halves_every_week() {
        let as_of = noon(2025, 11, 13);
        for days in [0_i64, 3, 7, 14, 30] {
            let history = WeightHistory {
                feedback: vec![(Rating::Liked, as_of - Duration::days(days))],
                last_completed_play: None,
            };
            #[allow(clippy::cast_precision_loss)]
            let expected = 1.0 + 0.5 * 0.5_f64.powf(days as f64 / 7.0);
            assert!((weight_from_history(&history, as_of) - expected).abs() < 1e-12);
        }
        assert!((liked_bonus(7) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_liked_bonuses_accumulate() {
        let as_of = noon(2025, 11, 13);
        let history = WeightHistory {
            feedback: vec![(Rating::Liked, as_of), (Rating::Liked, as_of), (Rating::Okay, as_of)],
            last_completed_play: None,
        };
        assert!((weight_from_history(&history, as_of) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_days_are_truncated() {
        let as_of = noon(2025, 11, 13);
        let history = WeightHistory {
            feedback: vec![(Rating::Liked, as_of - Duration::hours(7 * 24 - 1))],
            last_completed_play: None,
        };
        // 6 days and 23 hours counts as 6 days.
        let expected = 1.0 + liked_bonus(6);
        assert!((weight_from_history(&history, as_of) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_feedback_after_as_of_counts_as_today() {
        let as_of = noon(2025, 11, 13);
        let history = WeightHistory {
            feedback: vec![(Rating::Liked, as_of + Duration::days(3))],
            last_completed_play: None,
        };
        assert!((weight_from_history(&history, as_of) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_decay_never_reverses() {
        let liked_at = noon(2025, 1, 1);
        let history = WeightHistory {
            feedback: vec![(Rating::Liked, liked_at)],
            last_completed_play: None,
        };
        let mut previous = f64::INFINITY;
        for day in 0..120 {
            let weight = weight_from_history(&history, liked_at + Duration::days(day));
            assert!(weight <= previous, "weight rose on day {day}");
            assert!(weight >= BASELINE_WEIGHT);
            previous = weight;
        }
    }

    #[test]
    fn test_freshness_boost_is_linear_and_capped() {
        assert_eq!(freshness_boost(0), 0.0);
        assert_eq!(freshness_boost(14), 0.0);
        assert!((freshness_boost(30) - 0.16).abs() < 1e-12);
        assert!((freshness_boost(64) - 0.5).abs() < 1e-12);
        assert_eq!(freshness_boost(365), FRESHNESS_CAP);

        let as_of = noon(2025, 11, 13);
        let history = WeightHistory {
            feedback: Vec::new(),
            last_completed_play: Some(as_of - Duration::days(30)),
        };
        assert!((weight_from_history(&history, as_of) - 1.16).abs() < 1e-12);
    }

    #[test]
    fn test_distribution_statistics() {
        let stats = WeightDistribution::from_weights(&[0.0, 1.0, 2.0]);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 2.0);
        assert!((stats.mean - 1.0).abs() < 1e-12);
        assert!((stats.stddev - 1.0).abs() < 1e-12);

        assert_eq!(WeightDistribution::from_weights(&[]), WeightDistribution::default());
        assert_eq!(WeightDistribution::from_weights(&[1.5]).stddev, 0.0);
    }
}
