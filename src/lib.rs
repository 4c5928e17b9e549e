//! Nightly show scheduling for a child-facing media player.
//!
//! Core modules:
//! - [`weights`] - Selection weights from feedback and play history
//! - [`lineup`] - Lineup generation (candidate pool, requests, diversity fill)
//! - [`parser`] - Free-text request parsing with fuzzy series matching
//! - [`store`] / [`db`] - Repository trait and its SQLite implementation
//!
//! ### Supporting Modules
//!
//! - [`models`] - Records shared between the store and the core
//! - [`config`] - Settings loading and validation
//! - [`probe`] - Media duration lookup for intro/outro bookends
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use alma::config::Settings;
//! use alma::db::SqliteStore;
//! use alma::lineup::{LineupGenerator, LineupOptions};
//! use alma::parser::RequestParser;
//! use chrono::Local;
//!
//! let settings = Settings::load(None)?;
//! let store = SqliteStore::open(&settings.database_path)?;
//!
//! let parsed = RequestParser::new(&store, &settings).parse("tomorrow two blueie")?;
//! let date = parsed.target_date(Local::now().date_naive());
//!
//! let options = LineupOptions {
//!     request_payload: Some(parsed.payload()),
//!     ..LineupOptions::default()
//! };
//! let session = LineupGenerator::new(&store, &settings, None).generate_lineup(date, &options)?;
//! println!("Scheduled session: {session:?}");
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Weight Formula
//!
//! Each enabled episode starts at 1.0. Every LIKED rating adds a bonus of 0.5
//! that halves each week; a single NEVER rating zeroes the episode for good.
//! Episodes not watched for more than two weeks gain up to 0.5 more. See
//! [`weights`] for the exact terms.

pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod lineup;
pub mod models;
pub mod parser;
pub mod probe;
pub mod store;
pub mod weights;
