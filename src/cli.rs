//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Alma using Clap derive macros.
//! It gives the scheduler a small operator surface: generating and inspecting
//! nightly lineups, recording requests, and registering videos by hand.
//!
//! ## Commands
//!
//! - `generate`: Build (or fetch) the lineup for a night
//! - `show`: Print a stored lineup
//! - `parse` / `request`: Interpret a spoken request, optionally persisting it
//! - `weights`: Inspect current selection weights
//! - `add-video`, `disable`, `enable`: Library maintenance
//!
//! ## Examples
//!
//! ```bash
//! alma generate --request "two blueie"
//! alma show 2025-11-14 --json
//! alma request "tomorrow one blueie and two throw throw"
//! ```

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "alma")]
#[command(about = "Alma: nightly show lineups for the kids' media player")]
#[command(version)]
pub struct Args {
    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the lineup for a night
    ///
    /// Picks episodes by weighted random choice within the duration budget
    /// and stores them as a planned session. If the night already has a
    /// session, that session is shown instead. A pending stored request for
    /// the date is used when no --request is given.
    Generate {
        /// Night to schedule (YYYY-MM-DD), defaults to today
        date: Option<NaiveDate>,

        /// Total minutes including intro and outro (overrides settings)
        #[arg(long, value_name = "MINUTES")]
        duration: Option<u32>,

        /// Seed for reproducible selection
        #[arg(long)]
        seed: Option<u64>,

        /// Free-text request, e.g. "two blueie and one peppa"
        #[arg(long, value_hint = clap::ValueHint::Other)]
        request: Option<String>,
    },

    /// Show the stored lineup for a night
    Show {
        /// Night to show (YYYY-MM-DD), defaults to today
        date: Option<NaiveDate>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Parse a request and print the result as JSON
    ///
    /// Nothing is stored. Useful for checking nickname mappings.
    Parse {
        /// Request text, e.g. "tomorrow one blueie and two throw throw"
        text: String,
    },

    /// Parse a request and store it for the night it names
    ///
    /// The next `generate` for that night will honor it.
    Request {
        /// Request text, e.g. "tomorrow one blueie and two throw throw"
        text: String,

        /// Free-form note stored with the request
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show the highest weighted videos and the overall distribution
    Weights {
        /// Number of videos to list
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Hide videos below this weight
        #[arg(long, default_value = "0.0")]
        min_weight: f64,
    },

    /// Register a video file in the library
    AddVideo {
        #[arg(long)]
        series: String,

        #[arg(long)]
        season: u32,

        #[arg(long)]
        episode: u32,

        /// Path to the media file
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        path: PathBuf,

        /// Length in seconds
        #[arg(long)]
        duration: u32,

        #[arg(long)]
        title: Option<String>,
    },

    /// Exclude a video from future lineups
    Disable {
        /// Video id
        id: i64,
    },

    /// Make a disabled video eligible again
    Enable {
        /// Video id
        id: i64,
    },

    /// Generate shell completions
    ///
    /// Usage: alma completion bash > ~/.local/share/bash-completion/completions/alma
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}
