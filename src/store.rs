//! Repository interface the scheduling core is written against.
//!
//! [`SqliteStore`](crate::db::SqliteStore) is the production implementation.
//! Every method is its own short transaction; nothing holds a lock across calls.

use crate::models::{NewSession, PlayHistory, Rating, Request, Session, Video};
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;

pub trait Store {
    /// All videos ordered by id, optionally including disabled ones.
    fn list_videos(&self, include_disabled: bool) -> Result<Vec<Video>>;

    fn get_video(&self, id: i64) -> Result<Option<Video>>;

    /// Distinct series names of enabled videos, sorted.
    fn list_series(&self) -> Result<Vec<String>>;

    /// Ids of videos with a completed play at or after `cutoff`.
    fn completed_video_ids_since(&self, cutoff: NaiveDateTime) -> Result<HashSet<i64>>;

    /// Every rating given to any slot of this video, with its submission time.
    fn feedback_for_video(&self, video_id: i64) -> Result<Vec<(Rating, NaiveDateTime)>>;

    /// Start time of the most recent completed play of this video.
    fn last_completed_play(&self, video_id: i64) -> Result<Option<NaiveDateTime>>;

    fn find_session_by_date(&self, date: NaiveDate) -> Result<Option<Session>>;

    fn get_session(&self, id: i64) -> Result<Option<Session>>;

    /// Slots of a session in playback order.
    fn play_history(&self, session_id: i64) -> Result<Vec<PlayHistory>>;

    /// Insert a session and one slot per video (slot_order 1..N) atomically.
    ///
    /// If a session for `show_date` already exists, nothing is written and the
    /// existing id is returned.
    fn insert_session_with_slots(&self, session: &NewSession, video_ids: &[i64]) -> Result<i64>;

    /// Most recent unfulfilled request for `date`.
    fn pending_request_for(&self, date: NaiveDate) -> Result<Option<Request>>;

    fn mark_request_fulfilled(&self, request_id: i64, at: NaiveDateTime) -> Result<()>;
}
