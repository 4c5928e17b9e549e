//! # Lineup Generation
//!
//! Builds one night's session: a short, ordered run of episodes that fills the
//! time left after the intro and outro.
//!
//! ## Algorithm
//!
//! 1. **Candidate pool**: enabled videos minus those completed within the
//!    cooldown window. Videos of an explicitly requested series skip the
//!    cooldown.
//! 2. **Weights**: feedback weights from [`WeightCalculator`], tripled for
//!    requested series.
//! 3. **Requests**: for each `{series, count}`, draw `count` episodes of that
//!    series by weighted random choice.
//! 4. **Diversity fill**: keep drawing, preferring unused `(series, season)`
//!    pairs, accepting a draw only if it fits the budget plus a 60 second
//!    tolerance, until the episode cap is hit, the pool runs dry, or the
//!    minimum is met and the total is within 60 seconds of the budget.
//!
//! Draws are proportional to weight rather than best-first so the top episode
//! does not win every night. The generator owns its random source; the same
//! seed over the same pool and weights yields the same lineup.

use crate::config::Settings;
use crate::models::{NewSession, RequestItem, RequestPayload, Video};
use crate::probe::{DurationProbe, FfprobeProbe};
use crate::store::Store;
use crate::weights::WeightCalculator;
use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use log::{debug, error, info, trace, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Weight multiplier for every episode of a requested series.
pub const REQUEST_AFFINITY_BOOST: f64 = 3.0;
/// How far the lineup may run over (or stop short of) the budget.
pub const DURATION_TOLERANCE_SECS: i64 = 60;
pub const DEFAULT_MIN_EPISODES: usize = 3;
pub const DEFAULT_MAX_EPISODES: usize = 5;

/// Per-call knobs for [`LineupGenerator::generate_lineup`].
#[derive(Debug, Clone, PartialEq)]
pub struct LineupOptions {
    /// Falls back to the configured target when `None`.
    pub target_duration_minutes: Option<u32>,
    pub min_episodes: usize,
    pub max_episodes: usize,
    pub request_payload: Option<RequestPayload>,
}

impl Default for LineupOptions {
    fn default() -> Self {
        Self {
            target_duration_minutes: None,
            min_episodes: DEFAULT_MIN_EPISODES,
            max_episodes: DEFAULT_MAX_EPISODES,
            request_payload: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    /// Seconds left for episodes once bookends are subtracted. May be negative.
    pub available_duration: i64,
    pub min_episodes: usize,
    pub max_episodes: usize,
}

fn weight_of(weights: &HashMap<i64, f64>, video: &Video) -> f64 {
    weights.get(&video.id).copied().unwrap_or(0.0)
}

fn series_season(video: &Video) -> (String, u32) {
    (video.series.clone(), video.season)
}

/// Weighted random draw among `pool` (indices into `videos`).
///
/// `None` when the pool is empty or carries no weight.
fn weighted_pick<R: Rng + ?Sized>(
    pool: &[usize],
    videos: &[Video],
    weights: &HashMap<i64, f64>,
    rng: &mut R,
) -> Option<usize> {
    let dist = WeightedIndex::new(pool.iter().map(|&i| weight_of(weights, &videos[i]))).ok()?;
    Some(pool[dist.sample(rng)])
}

/// Choose the night's episodes, in playback order.
///
/// Candidates with zero weight are never drawn. Requested episodes come
/// first, in request order, and are not held to the duration budget.
pub fn select_episodes<R: Rng + ?Sized>(
    candidates: Vec<Video>,
    weights: &HashMap<i64, f64>,
    requests: &[RequestItem],
    limits: SelectionLimits,
    rng: &mut R,
) -> Vec<Video> {
    let mut valid: Vec<Video> = candidates
        .into_iter()
        .filter(|v| weight_of(weights, v) > 0.0)
        .collect();
    let mut selected: Vec<Video> = Vec::new();
    let mut total_duration: i64 = 0;
    let mut used: HashSet<(String, u32)> = HashSet::new();

    for request in requests {
        for taken in 0..request.count {
            let series_pool: Vec<usize> = (0..valid.len())
                .filter(|&i| valid[i].series == request.series)
                .collect();

            let Some(index) = weighted_pick(&series_pool, &valid, weights, rng) else {
                warn!(
                    "Not enough episodes to fulfill request for {}: got {taken} of {}",
                    request.series, request.count
                );
                break;
            };

            let chosen = valid.remove(index);
            total_duration += i64::from(chosen.duration_seconds);
            used.insert(series_season(&chosen));
            info!("Selected requested: {} {}", chosen.series, chosen.episode_code);
            selected.push(chosen);
        }
    }

    while selected.len() < limits.max_episodes {
        let mut pool: Vec<usize> = (0..valid.len())
            .filter(|&i| !used.contains(&series_season(&valid[i])))
            .collect();

        // Repeat a series/season only when the minimum is otherwise unreachable.
        if pool.is_empty() && selected.len() < limits.min_episodes {
            pool = (0..valid.len()).collect();
        }

        let Some(index) = weighted_pick(&pool, &valid, weights, rng) else {
            break;
        };

        // Drawn candidates leave the pool whether or not they fit.
        let chosen = valid.remove(index);
        let new_total = total_duration + i64::from(chosen.duration_seconds);

        if new_total > limits.available_duration + DURATION_TOLERANCE_SECS {
            trace!(
                "Skipping {} {}: {new_total}s would exceed {}s",
                chosen.series,
                chosen.episode_code,
                limits.available_duration
            );
            continue;
        }

        debug!(
            "Selected: {} {} ({}s, weight: {:.2})",
            chosen.series,
            chosen.episode_code,
            chosen.duration_seconds,
            weight_of(weights, &chosen)
        );
        total_duration = new_total;
        used.insert(series_season(&chosen));
        selected.push(chosen);

        if selected.len() >= limits.min_episodes
            && (total_duration - limits.available_duration).abs() < DURATION_TOLERANCE_SECS
        {
            break;
        }
    }

    info!(
        "Selected {} episodes, total duration: {total_duration}s (target: {}s, variance: {}s)",
        selected.len(),
        limits.available_duration,
        total_duration - limits.available_duration
    );

    selected
}

/// Multiply the weight of every candidate from a requested series by
/// [`REQUEST_AFFINITY_BOOST`], once per video however often its series is requested.
pub fn apply_request_boost(
    weights: &mut HashMap<i64, f64>,
    candidates: &[Video],
    requests: &[RequestItem],
) {
    let requested: HashSet<&str> = requests.iter().map(|r| r.series.as_str()).collect();
    for video in candidates {
        if requested.contains(video.series.as_str()) {
            if let Some(weight) = weights.get_mut(&video.id) {
                *weight *= REQUEST_AFFINITY_BOOST;
            }
        }
    }
}

/// Mean and sample standard deviation.
fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

fn log_kpis(selected: &[Video], weights: &HashMap<i64, f64>) {
    let chosen_weights: Vec<f64> = selected.iter().map(|v| weight_of(weights, v)).collect();
    let durations: Vec<f64> = selected.iter().map(|v| f64::from(v.duration_seconds)).collect();

    let (mean_weight, _) = mean_and_stddev(&chosen_weights);
    let (mean_duration, stddev_duration) = mean_and_stddev(&durations);

    info!(
        "KPIs - Weight: mean={mean_weight:.3}, Duration: mean={mean_duration:.1}s, variance={stddev_duration:.1}s"
    );
}

/// Generates and persists nightly lineups.
pub struct LineupGenerator<'a, S: Store + ?Sized> {
    store: &'a S,
    settings: &'a Settings,
    weights: WeightCalculator<'a, S>,
    probe: Box<dyn DurationProbe + 'a>,
    rng: StdRng,
    clock: Option<NaiveDateTime>,
}

impl<'a, S: Store + ?Sized> LineupGenerator<'a, S> {
    /// A fixed `seed` makes every draw reproducible.
    pub fn new(store: &'a S, settings: &'a Settings, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            store,
            settings,
            weights: WeightCalculator::new(store),
            probe: Box::new(FfprobeProbe),
            rng,
            clock: None,
        }
    }

    /// Use another duration lookup for the bookends.
    #[must_use]
    pub fn with_probe(mut self, probe: impl DurationProbe + 'a) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Freeze "now" (UTC), which anchors cooldowns and weight decay.
    #[must_use]
    pub fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.clock = Some(now);
        self
    }

    fn now(&self) -> NaiveDateTime {
        self.clock.unwrap_or_else(|| Utc::now().naive_utc())
    }

    fn bookend_duration(&self, path: Option<&Path>) -> u32 {
        path.and_then(|p| self.probe.duration_seconds(p)).unwrap_or(0)
    }

    /// Generate the lineup for `target_date`.
    ///
    /// Returns the existing session id if the date is already scheduled, and
    /// `Ok(None)` when the library cannot produce a lineup. Store errors
    /// propagate.
    pub fn generate_lineup(
        &mut self,
        target_date: NaiveDate,
        options: &LineupOptions,
    ) -> Result<Option<i64>> {
        let target_minutes = options
            .target_duration_minutes
            .unwrap_or(self.settings.target_duration_minutes);
        let target_seconds = i64::from(target_minutes) * 60;

        let intro = self.bookend_duration(self.settings.intro_path.as_deref());
        let outro = self.bookend_duration(self.settings.outro_path.as_deref());
        let available_duration = target_seconds - i64::from(intro) - i64::from(outro);

        info!(
            "Generating lineup for {target_date}: target {target_minutes}m, available {available_duration}s after intro/outro"
        );

        if let Some(existing) = self.store.find_session_by_date(target_date)? {
            warn!("Lineup already exists for {target_date}: session {}", existing.id);
            return Ok(Some(existing.id));
        }

        let requests = options
            .request_payload
            .as_ref()
            .map(RequestPayload::items)
            .unwrap_or_default();

        let candidates = self.build_candidate_pool(self.settings.repeat_cooldown_days, &requests)?;
        if candidates.is_empty() {
            error!("No candidate episodes available");
            return Ok(None);
        }

        let ids: Vec<i64> = candidates.iter().map(|v| v.id).collect();
        let mut weights = self.weights.calculate_weights_batch(&ids, self.now())?;

        apply_request_boost(&mut weights, &candidates, &requests);

        let limits = SelectionLimits {
            available_duration,
            min_episodes: options.min_episodes,
            max_episodes: options.max_episodes,
        };
        let selected = select_episodes(candidates, &weights, &requests, limits, &mut self.rng);

        if selected.is_empty() {
            error!("Could not select episodes for lineup");
            return Ok(None);
        }

        let new_session = NewSession {
            show_date: target_date,
            intro_path: self.settings.intro_path.as_ref().map(|p| p.display().to_string()),
            outro_path: self.settings.outro_path.as_ref().map(|p| p.display().to_string()),
            total_duration_seconds: selected.iter().map(|v| v.duration_seconds).sum(),
        };
        let video_ids: Vec<i64> = selected.iter().map(|v| v.id).collect();
        let session_id = self.store.insert_session_with_slots(&new_session, &video_ids)?;

        info!(
            "Created session {session_id} for {target_date} with {} episodes",
            selected.len()
        );
        log_kpis(&selected, &weights);

        Ok(Some(session_id))
    }

    /// Enabled videos not completed within `cooldown_days`, except that any
    /// video of a requested series is always included.
    pub fn build_candidate_pool(
        &self,
        cooldown_days: u32,
        requests: &[RequestItem],
    ) -> Result<Vec<Video>> {
        let videos = self.store.list_videos(false)?;
        let cutoff = self.now() - Duration::days(i64::from(cooldown_days));
        let recent = self.store.completed_video_ids_since(cutoff)?;
        let requested: HashSet<&str> = requests.iter().map(|r| r.series.as_str()).collect();

        let pool: Vec<Video> = videos
            .into_iter()
            .filter(|v| requested.contains(v.series.as_str()) || !recent.contains(&v.id))
            .collect();

        info!("Candidate pool: {} episodes", pool.len());
        Ok(pool)
    }

    /// Like [`generate_lineup`](Self::generate_lineup), but picks up the
    /// pending request stored for `target_date`, if any, and marks it
    /// fulfilled once the session is created.
    pub fn generate_for_date_with_pending_request(
        &mut self,
        target_date: NaiveDate,
        options: &LineupOptions,
    ) -> Result<Option<i64>> {
        if let Some(existing) = self.store.find_session_by_date(target_date)? {
            warn!("Lineup already exists for {target_date}: session {}", existing.id);
            return Ok(Some(existing.id));
        }

        let Some(request) = self.store.pending_request_for(target_date)? else {
            return self.generate_lineup(target_date, options);
        };

        info!("Using request {} for {target_date}", request.id);
        let options = LineupOptions {
            request_payload: Some(request.payload.clone()),
            ..options.clone()
        };

        let session = self.generate_lineup(target_date, &options)?;
        if session.is_some() {
            self.store.mark_request_fulfilled(request.id, self.now())?;
        }
        Ok(session)
    }
}
