//! # Alma - Nightly Show Scheduler
//!
//! Command-line front end for the lineup scheduler. Playback, the request UI
//! and the library scanner are separate programs sharing the same database;
//! this binary generates and inspects lineups and covers the maintenance
//! tasks those programs would otherwise do.
//!
//! ## Usage
//!
//! ```bash
//! # Schedule tonight
//! alma generate
//!
//! # Schedule tomorrow with a request
//! alma generate 2025-11-14 --request "two blueie"
//!
//! # Inspect
//! alma show --json
//! alma weights --limit 10
//! ```

use alma::cli::{Args, Command};
use alma::completion;
use alma::config::{Settings, MAX_TARGET_DURATION_MINUTES, MIN_TARGET_DURATION_MINUTES};
use alma::db::SqliteStore;
use alma::lineup::{LineupGenerator, LineupOptions};
use alma::models::{episode_code, NewVideo};
use alma::parser::RequestParser;
use alma::store::Store;
use alma::weights::WeightCalculator;
use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{CommandFactory, Parser};
use log::{debug, info};

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG` and defaults to `info`:
/// - `RUST_LOG=debug alma generate` - Show every selection decision
/// - `RUST_LOG=alma::lineup=trace alma generate` - Also show rejected candidates
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    // Completion needs neither settings nor a database.
    if let Command::Completion { shell } = args.command {
        let mut cmd = Args::command();
        completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        return Ok(());
    }

    let settings = Settings::load(args.config.as_deref())?;
    debug!("Using database {}", settings.database_path.display());
    let store = SqliteStore::open(&settings.database_path)?;
    let today = Local::now().date_naive();

    match args.command {
        Command::Generate { date, duration, seed, request } => {
            let date = date.unwrap_or(today);
            if let Some(minutes) = duration {
                if !(MIN_TARGET_DURATION_MINUTES..=MAX_TARGET_DURATION_MINUTES).contains(&minutes) {
                    bail!(
                        "--duration must be between {MIN_TARGET_DURATION_MINUTES} and {MAX_TARGET_DURATION_MINUTES} minutes"
                    );
                }
            }

            let mut options = LineupOptions {
                target_duration_minutes: duration,
                ..LineupOptions::default()
            };
            if let Some(text) = request {
                let parsed = RequestParser::new(&store, &settings).parse(&text)?;
                if parsed.requests.is_empty() {
                    eprintln!("No series recognized in {text:?}, generating without a request");
                } else {
                    options.request_payload = Some(parsed.payload());
                }
            }

            let mut generator = LineupGenerator::new(&store, &settings, seed);
            let session_id = if options.request_payload.is_some() {
                generator.generate_lineup(date, &options)?
            } else {
                generator.generate_for_date_with_pending_request(date, &options)?
            };

            match session_id {
                Some(id) => print_lineup(&store, id)?,
                None => bail!("Could not generate a lineup for {date}: no eligible episodes"),
            }
        }
        Command::Show { date, json } => {
            let date = date.unwrap_or(today);
            let Some(session) = store.find_session_by_date(date)? else {
                bail!("No lineup stored for {date}");
            };

            if json {
                let lineup = store.lineup(session.id)?;
                let out = serde_json::json!({ "session": session, "lineup": lineup });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_lineup(&store, session.id)?;
            }
        }
        Command::Parse { text } => {
            let parsed = RequestParser::new(&store, &settings).parse(&text)?;
            let out = serde_json::json!({
                "target_date": parsed.target_date(today),
                "day_offset": parsed.day_offset,
                "requests": parsed.requests,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Request { text, notes } => {
            let parsed = RequestParser::new(&store, &settings).parse(&text)?;
            if parsed.requests.is_empty() {
                bail!("No series recognized in {text:?}");
            }

            let target = parsed.target_date(today);
            let id = store.insert_request(target, &parsed.payload(), notes.as_deref())?;
            info!("Stored request {id} for {target}");
            println!("Request {id} for {target}:");
            for item in &parsed.requests {
                println!("  {} x{}", item.series, item.count);
            }
        }
        Command::Weights { limit, min_weight } => {
            let calculator = WeightCalculator::new(&store);
            let now = Utc::now().naive_utc();

            let top = calculator.get_top_weighted_videos(limit, min_weight, now)?;
            println!("{:>6}  {:>6}  {:<28} {}", "id", "weight", "series", "episode");
            for (id, weight) in top {
                let video = store
                    .get_video(id)?
                    .with_context(|| format!("Video {id} disappeared while listing"))?;
                println!(
                    "{id:>6}  {weight:>6.3}  {:<28} {}",
                    video.series, video.episode_code
                );
            }

            let ids: Vec<i64> = store.list_videos(false)?.iter().map(|v| v.id).collect();
            let stats = calculator.get_weight_distribution(&ids, now)?;
            println!();
            println!(
                "{} videos: min {:.3}, max {:.3}, mean {:.3}, stddev {:.3}",
                ids.len(),
                stats.min,
                stats.max,
                stats.mean,
                stats.stddev
            );
        }
        Command::AddVideo { series, season, episode, path, duration, title } => {
            let video = NewVideo {
                series,
                season,
                episode_code: episode_code(season, episode),
                title,
                path: path.display().to_string(),
                duration_seconds: duration,
                file_hash: None,
            };
            let id = store.insert_video(&video)?;
            println!("Added video {id}: {} {}", video.series, video.episode_code);
        }
        Command::Disable { id } => {
            if !store.set_video_disabled(id, true)? {
                bail!("No video with id {id}");
            }
            println!("Video {id} disabled");
        }
        Command::Enable { id } => {
            if !store.set_video_disabled(id, false)? {
                bail!("No video with id {id}");
            }
            println!("Video {id} enabled");
        }
        // Handled above.
        Command::Completion { .. } => {}
    }

    Ok(())
}

fn format_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn print_lineup(store: &SqliteStore, session_id: i64) -> Result<()> {
    let session = store
        .get_session(session_id)?
        .with_context(|| format!("Session {session_id} not found"))?;
    let lineup = store.lineup(session_id)?;

    println!(
        "Lineup for {} ({}, {} of episodes)",
        session.show_date,
        session.status,
        format_duration(session.total_duration_seconds)
    );
    if let Some(intro) = &session.intro_path {
        println!("      intro  {intro}");
    }
    for entry in &lineup {
        let video = &entry.video;
        println!(
            "{:>4}. {:<24} {}  {:>6}  {}",
            entry.slot_order,
            video.series,
            video.episode_code,
            format_duration(video.duration_seconds),
            video.title.as_deref().unwrap_or("")
        );
    }
    if let Some(outro) = &session.outro_path {
        println!("      outro  {outro}");
    }
    Ok(())
}
