//! # Alma Performance Benchmarks
//!
//! ## Benchmark Categories
//!
//! - **Weights**: The pure formula and store-backed batch calculation
//! - **Selection**: Weighted episode selection over an in-memory pool
//! - **Generation**: Full lineup generation against SQLite
//! - **Parsing**: Request parsing with fuzzy matching
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench weights
//! cargo bench lineup
//! ```

use alma::config::Settings;
use alma::db::SqliteStore;
use alma::lineup::{select_episodes, LineupGenerator, LineupOptions, SelectionLimits};
use alma::models::{episode_code, NewSession, NewVideo, Rating, RequestItem, Video};
use alma::parser::RequestParser;
use alma::probe::NoProbe;
use alma::store::Store;
use alma::weights::{weight_from_history, WeightCalculator, WeightHistory};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::hint::black_box;

const SERIES: [&str; 6] = [
    "Bluey",
    "Peppa Pig",
    "Throw_Throw_Burrito",
    "Paw Patrol",
    "Hey Duggee",
    "Puffin Rock",
];

fn as_of() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 11, 13)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid timestamp")
}

/// A library of `per_series` episodes for each series, with a month of
/// watched sessions and some feedback.
fn create_benchmark_store(per_series: u32) -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("Failed to open database");
    let mut ids = Vec::new();

    for series in SERIES {
        for n in 0..per_series {
            let season = n / 10 + 1;
            let episode = n % 10 + 1;
            ids.push(
                store
                    .insert_video(&NewVideo {
                        series: series.to_string(),
                        season,
                        episode_code: episode_code(season, episode),
                        title: None,
                        path: format!("/media/{series}/{season}/{episode}.mp4"),
                        duration_seconds: 300 + (n % 7) * 60,
                        file_hash: None,
                    })
                    .expect("Failed to insert video"),
            );
        }
    }

    for night in 0..30_i64 {
        let when = as_of() - Duration::days(night + 1);
        let start = usize::try_from(night).unwrap_or(0) * 3 % ids.len();
        let slice: Vec<i64> = ids.iter().cycle().skip(start).take(3).copied().collect();
        let session_id = store
            .insert_session_with_slots(
                &NewSession {
                    show_date: when.date(),
                    intro_path: None,
                    outro_path: None,
                    total_duration_seconds: 0,
                },
                &slice,
            )
            .expect("Failed to insert session");
        for (i, slot) in store.play_history(session_id).expect("slots").into_iter().enumerate() {
            store.mark_slot_completed(slot.id, when).expect("Failed to complete slot");
            let rating = match i {
                0 => Rating::Liked,
                1 => Rating::Okay,
                _ if night % 9 == 0 => Rating::Never,
                _ => continue,
            };
            store.add_feedback(slot.id, rating, when).expect("Failed to add feedback");
        }
    }

    store
}

fn benchmark_weights(c: &mut Criterion) {
    let mut group = c.benchmark_group("weights");

    let history = WeightHistory {
        feedback: (0..20)
            .map(|d| (Rating::Liked, as_of() - Duration::days(d)))
            .collect(),
        last_completed_play: Some(as_of() - Duration::days(40)),
    };
    group.bench_function("formula", |b| {
        b.iter(|| weight_from_history(black_box(&history), black_box(as_of())));
    });

    for per_series in [10_u32, 50] {
        let store = create_benchmark_store(per_series);
        let ids: Vec<i64> = store.list_videos(false).expect("videos").iter().map(|v| v.id).collect();
        let calculator = WeightCalculator::new(&store);

        group.bench_with_input(BenchmarkId::new("batch", ids.len()), &ids, |b, ids| {
            b.iter(|| calculator.calculate_weights_batch(black_box(ids), as_of()).expect("weights"));
        });
    }

    group.finish();
}

fn benchmark_lineup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lineup");

    let store = create_benchmark_store(30);
    let candidates: Vec<Video> = store.list_videos(false).expect("videos");
    let weights: HashMap<i64, f64> = candidates
        .iter()
        .map(|v| (v.id, 1.0 + f64::from(u32::try_from(v.id % 5).unwrap_or(0)) / 4.0))
        .collect();
    let requests = vec![RequestItem::new("Bluey", 2)];
    let limits = SelectionLimits {
        available_duration: 1800,
        min_episodes: 3,
        max_episodes: 5,
    };

    group.bench_function("select_episodes", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        b.iter_batched(
            || candidates.clone(),
            |pool| select_episodes(pool, &weights, black_box(&requests), limits, &mut rng),
            BatchSize::SmallInput,
        );
    });

    let settings = Settings::default();
    group.bench_function("generate_lineup", |b| {
        b.iter_batched(
            || create_benchmark_store(30),
            |store| {
                LineupGenerator::new(&store, &settings, Some(7))
                    .with_probe(NoProbe)
                    .with_clock(as_of())
                    .generate_lineup(as_of().date() + Duration::days(1), &LineupOptions::default())
                    .expect("lineup")
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn benchmark_parser(c: &mut Criterion) {
    let store = create_benchmark_store(10);
    let mut settings = Settings::default();
    settings.keyword_map.insert("blueie".to_string(), "Bluey".to_string());
    let parser = RequestParser::new(&store, &settings);

    c.bench_function("parse_request", |b| {
        b.iter(|| {
            parser
                .parse(black_box("tomorrow two blueie and one peppa, three puffin"))
                .expect("parse")
        });
    });
}

criterion_group!(benches, benchmark_weights, benchmark_lineup, benchmark_parser);
criterion_main!(benches);
