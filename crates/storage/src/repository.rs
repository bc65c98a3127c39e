//! Repository Implementation

use crate::settings::Settings;
use crate::{format_timestamp, parse_timestamp, StorageError};
use chrono::{NaiveDate, NaiveDateTime};
use detector::EventType;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS sessions (
        session_id INTEGER PRIMARY KEY AUTOINCREMENT,
        start_time TEXT NOT NULL,
        end_time TEXT,
        total_active_time_sec INTEGER DEFAULT 0,
        total_idle_time_sec INTEGER DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS events (
        event_id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        value_numeric REAL,
        value_text TEXT,
        FOREIGN KEY (session_id) REFERENCES sessions (session_id)
    )",
    "CREATE TABLE IF NOT EXISTS settings (
        id INTEGER PRIMARY KEY,
        user_name TEXT DEFAULT 'User',
        goal_blink_rate INTEGER DEFAULT 20,
        goal_breaks INTEGER DEFAULT 5,
        enable_weekly_goals BOOLEAN DEFAULT 1,
        enable_daily_streak BOOLEAN DEFAULT 0,
        master_notifications BOOLEAN DEFAULT 1,
        notify_blink BOOLEAN DEFAULT 1,
        notify_break BOOLEAN DEFAULT 1,
        notify_frequency INTEGER DEFAULT 30,
        active_start_time TEXT DEFAULT '09:00',
        active_end_time TEXT DEFAULT '17:00'
    )",
    "INSERT OR IGNORE INTO settings (id) VALUES (1)",
];

/// One monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: i64,
    pub start_time: NaiveDateTime,
    /// Unset while the session is open
    pub end_time: Option<NaiveDateTime>,
    pub total_active_time_sec: i64,
    pub total_idle_time_sec: i64,
}

impl SessionRecord {
    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }

    fn from_row(row: &SqliteRow) -> Result<Self, StorageError> {
        let start: String = row.try_get("start_time")?;
        let end: Option<String> = row.try_get("end_time")?;
        Ok(Self {
            session_id: row.try_get("session_id")?,
            start_time: parse_timestamp(&start)?,
            end_time: end.as_deref().map(parse_timestamp).transpose()?,
            total_active_time_sec: row
                .try_get::<Option<i64>, _>("total_active_time_sec")?
                .unwrap_or(0),
            total_idle_time_sec: row
                .try_get::<Option<i64>, _>("total_idle_time_sec")?
                .unwrap_or(0),
        })
    }
}

/// Per-type event totals for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCounts(HashMap<EventType, u64>);

impl EventCounts {
    pub fn get(&self, event_type: EventType) -> u64 {
        self.0.get(&event_type).copied().unwrap_or(0)
    }

    /// Micro-sleeps, yawns and fatigue alerts combined
    pub fn fatigue_events(&self) -> u64 {
        EventType::FATIGUE.iter().map(|t| self.get(*t)).sum()
    }
}

impl FromIterator<(EventType, u64)> for EventCounts {
    fn from_iter<I: IntoIterator<Item = (EventType, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Repository for sessions, events and settings
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Open (creating if missing) the database at `url` and apply the schema
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        info!("Opening database {}", url);
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    /// Private in-memory database on a single long-lived connection
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Database schema ready");
        Ok(())
    }

    /// Open a new session and return its id
    pub async fn start_session(&self, start: NaiveDateTime) -> Result<i64, StorageError> {
        let result = sqlx::query("INSERT INTO sessions (start_time) VALUES (?)")
            .bind(format_timestamp(start))
            .execute(&self.pool)
            .await?;
        let id = result.last_insert_rowid();
        info!("Started session {}", id);
        Ok(id)
    }

    /// Append one event row
    pub async fn log_event(
        &self,
        session_id: i64,
        event_type: EventType,
        value_numeric: Option<f64>,
        value_text: Option<&str>,
        at: NaiveDateTime,
    ) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO events (session_id, timestamp, event_type, value_numeric, value_text)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(format_timestamp(at))
        .bind(event_type.as_str())
        .bind(value_numeric)
        .bind(value_text)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Close a session with its final totals
    pub async fn end_session(
        &self,
        session_id: i64,
        active_secs: i64,
        idle_secs: i64,
        end: NaiveDateTime,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE sessions SET end_time = ?, total_active_time_sec = ?, total_idle_time_sec = ?
             WHERE session_id = ?",
        )
        .bind(format_timestamp(end))
        .bind(active_secs)
        .bind(idle_secs)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        info!(
            "Session {} ended. Active: {}s, Idle: {}s",
            session_id, active_secs, idle_secs
        );
        Ok(())
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Option<SessionRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(SessionRecord::from_row).transpose()
    }

    /// Most recent completed sessions, newest first, excluding one id
    pub async fn recent_completed_sessions(
        &self,
        exclude: i64,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM sessions
             WHERE end_time IS NOT NULL AND session_id != ?
             ORDER BY start_time DESC
             LIMIT ?",
        )
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(SessionRecord::from_row).collect()
    }

    /// Sessions started at or after `since`, oldest first
    pub async fn sessions_since(&self, since: NaiveDateTime) -> Result<Vec<SessionRecord>, StorageError> {
        let rows = sqlx::query("SELECT * FROM sessions WHERE start_time >= ? ORDER BY start_time")
            .bind(format_timestamp(since))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(SessionRecord::from_row).collect()
    }

    /// Distinct calendar days with a session, newest first
    pub async fn session_days(&self) -> Result<Vec<NaiveDate>, StorageError> {
        let rows = sqlx::query(
            "SELECT DISTINCT date(start_time) AS day FROM sessions ORDER BY day DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let day: String = row.try_get("day")?;
                NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map_err(|e| StorageError::SerializationError(e.to_string()))
            })
            .collect()
    }

    /// Per-type event counts for one session
    pub async fn event_counts(&self, session_id: i64) -> Result<EventCounts, StorageError> {
        let rows = sqlx::query(
            "SELECT event_type, COUNT(*) AS n FROM events WHERE session_id = ? GROUP BY event_type",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("event_type")?;
            let n: i64 = row.try_get("n")?;
            match name.parse::<EventType>() {
                Ok(t) => counts.push((t, n.max(0) as u64)),
                Err(e) => warn!("Skipping event rows: {}", e),
            }
        }
        Ok(counts.into_iter().collect())
    }

    /// Numeric payloads of every event of one type, across all sessions
    pub async fn event_values(&self, event_type: EventType) -> Result<Vec<f64>, StorageError> {
        let rows = sqlx::query(
            "SELECT value_numeric FROM events
             WHERE event_type = ? AND value_numeric IS NOT NULL
             ORDER BY event_id",
        )
        .bind(event_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<f64, _>("value_numeric").map_err(StorageError::from))
            .collect()
    }

    /// Timestamps of every event whose type is in `types`
    pub async fn event_timestamps(&self, types: &[EventType]) -> Result<Vec<NaiveDateTime>, StorageError> {
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!("SELECT timestamp FROM events WHERE event_type IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for t in types {
            query = query.bind(t.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let ts: String = row.try_get("timestamp")?;
                parse_timestamp(&ts)
            })
            .collect()
    }

    /// The settings row, `None` if it was deleted
    pub async fn get_settings(&self) -> Result<Option<Settings>, StorageError> {
        let row = sqlx::query("SELECT * FROM settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // NULL columns fall back to the defaults
        let d = Settings::default();
        Ok(Some(Settings {
            user_name: row.try_get::<Option<String>, _>("user_name")?.unwrap_or(d.user_name),
            goal_blink_rate: opt_u32(&row, "goal_blink_rate")?.unwrap_or(d.goal_blink_rate),
            goal_breaks: opt_u32(&row, "goal_breaks")?.unwrap_or(d.goal_breaks),
            enable_weekly_goals: row
                .try_get::<Option<bool>, _>("enable_weekly_goals")?
                .unwrap_or(d.enable_weekly_goals),
            enable_daily_streak: row
                .try_get::<Option<bool>, _>("enable_daily_streak")?
                .unwrap_or(d.enable_daily_streak),
            master_notifications: row
                .try_get::<Option<bool>, _>("master_notifications")?
                .unwrap_or(d.master_notifications),
            notify_blink: row
                .try_get::<Option<bool>, _>("notify_blink")?
                .unwrap_or(d.notify_blink),
            notify_break: row
                .try_get::<Option<bool>, _>("notify_break")?
                .unwrap_or(d.notify_break),
            notify_frequency: opt_u32(&row, "notify_frequency")?.unwrap_or(d.notify_frequency),
            active_start_time: row
                .try_get::<Option<String>, _>("active_start_time")?
                .unwrap_or(d.active_start_time),
            active_end_time: row
                .try_get::<Option<String>, _>("active_end_time")?
                .unwrap_or(d.active_end_time),
        }))
    }

    /// Replace the settings row
    pub async fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO settings (
                id, user_name, goal_blink_rate, goal_breaks,
                enable_weekly_goals, enable_daily_streak, master_notifications,
                notify_blink, notify_break, notify_frequency,
                active_start_time, active_end_time
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&settings.user_name)
        .bind(settings.goal_blink_rate)
        .bind(settings.goal_breaks)
        .bind(settings.enable_weekly_goals)
        .bind(settings.enable_daily_streak)
        .bind(settings.master_notifications)
        .bind(settings.notify_blink)
        .bind(settings.notify_break)
        .bind(settings.notify_frequency)
        .bind(&settings.active_start_time)
        .bind(&settings.active_end_time)
        .execute(&self.pool)
        .await?;
        debug!("Settings saved");
        Ok(())
    }

    pub async fn set_user_name(&self, name: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT OR IGNORE INTO settings (id) VALUES (1)")
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE settings SET user_name = ? WHERE id = 1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove the settings row (tests and resets)
    pub async fn clear_settings(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM settings").execute(&self.pool).await?;
        Ok(())
    }
}

fn opt_u32(row: &SqliteRow, column: &str) -> Result<Option<u32>, StorageError> {
    let value: Option<i64> = row.try_get(column)?;
    Ok(value.map(|v| v.clamp(0, u32::MAX as i64) as u32))
}
