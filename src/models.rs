//! # Data Model
//!
//! Plain value records handed out by the [`Store`](crate::store::Store).
//! Nothing here talks to the database; every mutation goes through an explicit
//! store call, so a `Video` you hold is a snapshot, never a live row.

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Count used when a legacy `{"series": X}` payload omits `count`.
pub const LEGACY_REQUEST_COUNT: u32 = 3;

/// Canonical episode code, e.g. `S01E07`.
#[must_use]
pub fn episode_code(season: u32, episode: u32) -> String {
    format!("S{season:02}E{episode:02}")
}

/// A playable episode from the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub series: String,
    pub season: u32,
    pub episode_code: String,
    pub title: Option<String>,
    /// Unique filesystem locator.
    pub path: String,
    pub duration_seconds: u32,
    pub added_at: NaiveDateTime,
    /// Disabled videos are never selected.
    pub disabled: bool,
    /// Change-detection fingerprint from the scanner. Not used for scheduling.
    pub file_hash: Option<String>,
}

/// What the scanner hands over when registering a new file.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub series: String,
    pub season: u32,
    pub episode_code: String,
    pub title: Option<String>,
    pub path: String,
    pub duration_seconds: u32,
    pub file_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Planned,
    Completed,
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "planned" => Ok(Self::Planned),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(anyhow!("Unknown session status: {other}")),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One day's viewing block. At most one per `show_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub show_date: NaiveDate,
    pub status: SessionStatus,
    pub generated_at: NaiveDateTime,
    pub intro_path: Option<String>,
    pub outro_path: Option<String>,
    /// Sum of the selected episodes only; bookends are not included.
    pub total_duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub show_date: NaiveDate,
    pub intro_path: Option<String>,
    pub outro_path: Option<String>,
    pub total_duration_seconds: u32,
}

/// One ordered slot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayHistory {
    pub id: i64,
    pub session_id: i64,
    pub video_id: i64,
    /// 1-based, contiguous within a session.
    pub slot_order: u32,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Liked,
    Okay,
    /// Hard exclusion: the episode is never picked again on its own merit.
    Never,
}

impl Rating {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Liked => "liked",
            Self::Okay => "okay",
            Self::Never => "never",
        }
    }
}

impl FromStr for Rating {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "liked" => Ok(Self::Liked),
            "okay" => Ok(Self::Okay),
            "never" => Ok(Self::Never),
            other => Err(anyhow!("Unknown rating: {other}")),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rating attached to exactly one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: i64,
    pub play_history_id: i64,
    pub rating: Rating,
    pub submitted_at: NaiveDateTime,
}

/// "N episodes of this series".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub series: String,
    pub count: u32,
}

impl RequestItem {
    pub fn new(series: impl Into<String>, count: u32) -> Self {
        Self { series: series.into(), count }
    }
}

/// Request payload as produced by the parser or the request UI.
///
/// Both shapes are accepted:
///
/// ```
/// use alma::models::{RequestItem, RequestPayload};
///
/// let multi: RequestPayload =
///     serde_json::from_str(r#"{"requests": [{"series": "Bluey", "count": 2}]}"#)?;
/// let legacy: RequestPayload = serde_json::from_str(r#"{"series": "Bluey"}"#)?;
///
/// assert_eq!(multi.items(), vec![RequestItem::new("Bluey", 2)]);
/// assert_eq!(legacy.items(), vec![RequestItem::new("Bluey", 3)]);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestPayload {
    Multi {
        requests: Vec<RequestItem>,
    },
    Legacy {
        series: String,
        #[serde(default = "legacy_count")]
        count: u32,
    },
}

fn legacy_count() -> u32 {
    LEGACY_REQUEST_COUNT
}

impl RequestPayload {
    /// Normalize into the general multi-request list.
    #[must_use]
    pub fn items(&self) -> Vec<RequestItem> {
        match self {
            Self::Multi { requests } => requests.clone(),
            Self::Legacy { series, count } => vec![RequestItem::new(series.clone(), *count)],
        }
    }
}

impl From<Vec<RequestItem>> for RequestPayload {
    fn from(requests: Vec<RequestItem>) -> Self {
        Self::Multi { requests }
    }
}

/// A persisted request waiting for the lineup of `target_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub target_date: NaiveDate,
    pub payload: RequestPayload,
    pub notes: Option<String>,
    pub fulfilled: bool,
    pub created_at: NaiveDateTime,
    pub fulfilled_at: Option<NaiveDateTime>,
}

/// A slot joined with its video, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineupEntry {
    pub slot_order: u32,
    pub completed: bool,
    pub video: Video,
}
