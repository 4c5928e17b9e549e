//! SQLite storage for videos, sessions, play history, feedback and requests.
//!
//! The schema enforces the invariants the scheduler relies on: one session per
//! `show_date`, one feedback per slot, unique video paths. Timestamps are
//! stored as UTC text in rusqlite's chrono format so they sort lexically.

use crate::models::{
    LineupEntry, NewSession, NewVideo, PlayHistory, Rating, Request, RequestPayload, Session,
    SessionStatus, Video,
};
use crate::store::Store;
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use log::{debug, info, warn};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const VIDEO_COLUMNS: &str =
    "id, series, season, episode_code, title, path, duration_seconds, added_at, disabled, file_hash";

const SESSION_COLUMNS: &str =
    "id, show_date, status, generated_at, intro_path, outro_path, total_duration_seconds";

const PLAY_HISTORY_COLUMNS: &str =
    "id, session_id, video_id, slot_order, started_at, ended_at, completed";

const REQUEST_COLUMNS: &str =
    "id, target_date, payload, notes, fulfilled, created_at, fulfilled_at";

impl ToSql for SessionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SessionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

impl ToSql for Rating {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Rating {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        series: row.get(1)?,
        season: row.get(2)?,
        episode_code: row.get(3)?,
        title: row.get(4)?,
        path: row.get(5)?,
        duration_seconds: row.get(6)?,
        added_at: row.get(7)?,
        disabled: row.get(8)?,
        file_hash: row.get(9)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        show_date: row.get(1)?,
        status: row.get(2)?,
        generated_at: row.get(3)?,
        intro_path: row.get(4)?,
        outro_path: row.get(5)?,
        total_duration_seconds: row.get(6)?,
    })
}

fn play_history_from_row(row: &Row<'_>) -> rusqlite::Result<PlayHistory> {
    Ok(PlayHistory {
        id: row.get(0)?,
        session_id: row.get(1)?,
        video_id: row.get(2)?,
        slot_order: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        completed: row.get(6)?,
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<Request> {
    let payload: String = row.get(2)?;
    let payload: RequestPayload = serde_json::from_str(&payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Request {
        id: row.get(0)?,
        target_date: row.get(1)?,
        payload,
        notes: row.get(3)?,
        fulfilled: row.get(4)?,
        created_at: row.get(5)?,
        fulfilled_at: row.get(6)?,
    })
}

/// rusqlite-backed [`Store`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories, and
    /// bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Fresh private database, used by tests and benchmarks.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Idempotent schema creation.
    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                series TEXT NOT NULL,
                season INTEGER NOT NULL,
                episode_code TEXT NOT NULL,
                title TEXT,
                path TEXT NOT NULL UNIQUE,
                duration_seconds INTEGER NOT NULL CHECK (duration_seconds > 0),
                added_at TEXT NOT NULL,
                disabled INTEGER NOT NULL DEFAULT 0,
                file_hash TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_videos_series ON videos(series);

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                show_date TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'planned',
                generated_at TEXT NOT NULL,
                intro_path TEXT,
                outro_path TEXT,
                total_duration_seconds INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS play_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                video_id INTEGER NOT NULL REFERENCES videos(id),
                slot_order INTEGER NOT NULL,
                started_at TEXT,
                ended_at TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                UNIQUE(session_id, slot_order)
            );
            CREATE INDEX IF NOT EXISTS idx_play_history_video ON play_history(video_id);

            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                play_history_id INTEGER NOT NULL UNIQUE
                    REFERENCES play_history(id) ON DELETE CASCADE,
                rating TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_date TEXT NOT NULL,
                payload TEXT NOT NULL,
                notes TEXT,
                fulfilled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                fulfilled_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_requests_target ON requests(target_date);
            "#,
            )
            .context("Failed to create database schema")?;
        Ok(())
    }

    /// Register a scanned file. Returns the new video id.
    pub fn insert_video(&self, video: &NewVideo) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO videos (series, season, episode_code, title, path, duration_seconds, added_at, disabled, file_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
                params![
                    video.series,
                    video.season,
                    video.episode_code,
                    video.title,
                    video.path,
                    video.duration_seconds,
                    now(),
                    video.file_hash,
                ],
            )
            .with_context(|| format!("Failed to insert video {}", video.path))?;
        let id = self.conn.last_insert_rowid();
        debug!("Inserted video {id}: {} {}", video.series, video.episode_code);
        Ok(id)
    }

    /// Returns `false` when no such video exists.
    pub fn set_video_disabled(&self, id: i64, disabled: bool) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE videos SET disabled = ?1 WHERE id = ?2", params![disabled, id])
            .with_context(|| format!("Failed to update disabled flag of video {id}"))?;
        Ok(changed > 0)
    }

    pub fn mark_slot_started(&self, play_history_id: i64, at: NaiveDateTime) -> Result<()> {
        self.conn
            .execute(
                "UPDATE play_history SET started_at = ?1 WHERE id = ?2",
                params![at, play_history_id],
            )
            .with_context(|| format!("Failed to mark slot {play_history_id} started"))?;
        Ok(())
    }

    /// Completion also backfills `started_at` if playback never reported a start.
    pub fn mark_slot_completed(&self, play_history_id: i64, ended_at: NaiveDateTime) -> Result<()> {
        self.conn
            .execute(
                "UPDATE play_history
                 SET completed = 1, ended_at = ?1, started_at = COALESCE(started_at, ?1)
                 WHERE id = ?2",
                params![ended_at, play_history_id],
            )
            .with_context(|| format!("Failed to mark slot {play_history_id} completed"))?;
        Ok(())
    }

    pub fn set_session_status(&self, session_id: i64, status: SessionStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sessions SET status = ?1 WHERE id = ?2",
                params![status, session_id],
            )
            .with_context(|| format!("Failed to set status of session {session_id}"))?;
        Ok(())
    }

    /// One rating per slot; a second rating for the same slot is a constraint error.
    pub fn add_feedback(
        &self,
        play_history_id: i64,
        rating: Rating,
        submitted_at: NaiveDateTime,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO feedback (play_history_id, rating, submitted_at) VALUES (?1, ?2, ?3)",
                params![play_history_id, rating, submitted_at],
            )
            .with_context(|| format!("Failed to store feedback for slot {play_history_id}"))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Remove a session with its slots and their feedback, so the date can be
    /// generated again.
    pub fn delete_session(&self, session_id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM feedback WHERE play_history_id IN
                (SELECT id FROM play_history WHERE session_id = ?1)",
            [session_id],
        )?;
        tx.execute("DELETE FROM play_history WHERE session_id = ?1", [session_id])?;
        tx.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
        tx.commit()
            .with_context(|| format!("Failed to delete session {session_id}"))?;
        info!("Deleted session {session_id}");
        Ok(())
    }

    pub fn insert_request(
        &self,
        target_date: NaiveDate,
        payload: &RequestPayload,
        notes: Option<&str>,
    ) -> Result<i64> {
        let payload = serde_json::to_string(payload).context("Failed to encode request payload")?;
        self.conn
            .execute(
                "INSERT INTO requests (target_date, payload, notes, fulfilled, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![target_date, payload, notes, now()],
            )
            .with_context(|| format!("Failed to store request for {target_date}"))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// A session's slots joined with their videos, in playback order.
    pub fn lineup(&self, session_id: i64) -> Result<Vec<LineupEntry>> {
        let sql = format!(
            "SELECT ph.slot_order, ph.completed, {}
             FROM play_history ph JOIN videos v ON v.id = ph.video_id
             WHERE ph.session_id = ?1
             ORDER BY ph.slot_order",
            VIDEO_COLUMNS
                .split(", ")
                .map(|c| format!("v.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([session_id], |row| {
            Ok(LineupEntry {
                slot_order: row.get(0)?,
                completed: row.get(1)?,
                video: Video {
                    id: row.get(2)?,
                    series: row.get(3)?,
                    season: row.get(4)?,
                    episode_code: row.get(5)?,
                    title: row.get(6)?,
                    path: row.get(7)?,
                    duration_seconds: row.get(8)?,
                    added_at: row.get(9)?,
                    disabled: row.get(10)?,
                    file_hash: row.get(11)?,
                },
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("Failed to read lineup row")?);
        }
        Ok(out)
    }
}

impl Store for SqliteStore {
    fn list_videos(&self, include_disabled: bool) -> Result<Vec<Video>> {
        let sql = if include_disabled {
            format!("SELECT {VIDEO_COLUMNS} FROM videos ORDER BY id")
        } else {
            format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE disabled = 0 ORDER BY id")
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], video_from_row)?;

        let mut videos = Vec::new();
        for row in rows {
            videos.push(row.context("Failed to read video row")?);
        }
        Ok(videos)
    }

    fn get_video(&self, id: i64) -> Result<Option<Video>> {
        self.conn
            .query_row(
                &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?1"),
                [id],
                video_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query video {id}"))
    }

    fn list_series(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT series FROM videos WHERE disabled = 0 ORDER BY series")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut series = Vec::new();
        for row in rows {
            series.push(row?);
        }
        Ok(series)
    }

    fn completed_video_ids_since(&self, cutoff: NaiveDateTime) -> Result<HashSet<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT video_id FROM play_history
             WHERE completed = 1 AND COALESCE(started_at, ended_at) >= ?1",
        )?;
        let rows = stmt.query_map([cutoff], |row| row.get(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    fn feedback_for_video(&self, video_id: i64) -> Result<Vec<(Rating, NaiveDateTime)>> {
        let mut stmt = self.conn.prepare(
            "SELECT f.rating, f.submitted_at
             FROM feedback f JOIN play_history ph ON ph.id = f.play_history_id
             WHERE ph.video_id = ?1
             ORDER BY f.submitted_at",
        )?;
        let rows = stmt.query_map([video_id], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut feedback = Vec::new();
        for row in rows {
            feedback.push(row.with_context(|| format!("Failed to read feedback of video {video_id}"))?);
        }
        Ok(feedback)
    }

    fn last_completed_play(&self, video_id: i64) -> Result<Option<NaiveDateTime>> {
        // MAX() over no rows yields a single NULL row.
        self.conn
            .query_row(
                "SELECT MAX(COALESCE(started_at, ended_at)) FROM play_history
                 WHERE video_id = ?1 AND completed = 1",
                [video_id],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to query last play of video {video_id}"))
    }

    fn find_session_by_date(&self, date: NaiveDate) -> Result<Option<Session>> {
        self.conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE show_date = ?1"),
                [date],
                session_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query session for {date}"))
    }

    fn get_session(&self, id: i64) -> Result<Option<Session>> {
        self.conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [id],
                session_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query session {id}"))
    }

    fn play_history(&self, session_id: i64) -> Result<Vec<PlayHistory>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAY_HISTORY_COLUMNS} FROM play_history WHERE session_id = ?1 ORDER BY slot_order"
        ))?;
        let rows = stmt.query_map([session_id], play_history_from_row)?;

        let mut slots = Vec::new();
        for row in rows {
            slots.push(row?);
        }
        Ok(slots)
    }

    fn insert_session_with_slots(&self, session: &NewSession, video_ids: &[i64]) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        let inserted = tx
            .execute(
                "INSERT INTO sessions (show_date, status, generated_at, intro_path, outro_path, total_duration_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(show_date) DO NOTHING",
                params![
                    session.show_date,
                    SessionStatus::Planned,
                    now(),
                    session.intro_path,
                    session.outro_path,
                    session.total_duration_seconds,
                ],
            )
            .with_context(|| format!("Failed to insert session for {}", session.show_date))?;

        if inserted == 0 {
            let existing: i64 = tx.query_row(
                "SELECT id FROM sessions WHERE show_date = ?1",
                [session.show_date],
                |row| row.get(0),
            )?;
            tx.commit()?;
            warn!(
                "Session for {} was created concurrently, keeping session {existing}",
                session.show_date
            );
            return Ok(existing);
        }

        let session_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO play_history (session_id, video_id, slot_order, completed)
                 VALUES (?1, ?2, ?3, 0)",
            )?;
            for (slot_order, video_id) in (1u32..).zip(video_ids) {
                stmt.execute(params![session_id, video_id, slot_order])
                    .with_context(|| format!("Failed to insert slot {slot_order} of session {session_id}"))?;
            }
        }

        tx.commit().context("Committing session transaction failed")?;
        Ok(session_id)
    }

    fn pending_request_for(&self, date: NaiveDate) -> Result<Option<Request>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM requests
                     WHERE target_date = ?1 AND fulfilled = 0
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                [date],
                request_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query pending request for {date}"))
    }

    fn mark_request_fulfilled(&self, request_id: i64, at: NaiveDateTime) -> Result<()> {
        self.conn
            .execute(
                "UPDATE requests SET fulfilled = 1, fulfilled_at = ?1 WHERE id = ?2",
                params![at, request_id],
            )
            .with_context(|| format!("Failed to mark request {request_id} fulfilled"))?;
        Ok(())
    }
}
