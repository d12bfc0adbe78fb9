//! Storage layer for timelog.
//!
//! Implements [`SessionStore`] on top of `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved between threads but not shared without external
//! synchronization. The CLI opens one connection per invocation.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g. `2025-01-15T10:30:00.000Z`), so lexicographic order is chronological
//! order and range filters can run in SQL.
//!
//! ## Relations
//!
//! `parent_session_id` cascades on delete: removing a session removes its
//! interruptions. `continues_session_id` is set to NULL when its root goes.
//! Tags live in `session_tags` with their position so their order survives.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tl_core::{NewSession, Session, SessionId, SessionState, SessionStore, TrackError};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for session {session_id}: {timestamp}")]
    TimestampParse {
        session_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A row that does not describe a valid session.
    #[error("invalid session row {session_id}: {message}")]
    InvalidSessionRow { session_id: i64, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

const SESSION_COLUMNS: &str = "id, start_time, end_time, description, project, estimate_minutes, \
     explicit_duration_minutes, remark, state, parent_session_id, continues_session_id";

/// A `sessions` row before validation.
struct SessionRow {
    id: i64,
    start_time: String,
    end_time: Option<String>,
    description: String,
    project: Option<String>,
    estimate_minutes: Option<u32>,
    explicit_duration_minutes: Option<u32>,
    remark: Option<String>,
    state: String,
    parent_session_id: Option<i64>,
    continues_session_id: Option<i64>,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            start_time: row.get(1)?,
            end_time: row.get(2)?,
            description: row.get(3)?,
            project: row.get(4)?,
            estimate_minutes: row.get(5)?,
            explicit_duration_minutes: row.get(6)?,
            remark: row.get(7)?,
            state: row.get(8)?,
            parent_session_id: row.get(9)?,
            continues_session_id: row.get(10)?,
        })
    }

    fn into_session(self, tags: Vec<String>) -> Result<Session, DbError> {
        let row_id = self.id;
        let invalid = |message: String| DbError::InvalidSessionRow {
            session_id: row_id,
            message,
        };
        let id = |value: i64| SessionId::new(value).map_err(|err| invalid(err.to_string()));

        Ok(Session {
            id: id(self.id)?,
            start_time: parse_timestamp(&self.start_time, row_id)?,
            end_time: self
                .end_time
                .as_deref()
                .map(|end| parse_timestamp(end, row_id))
                .transpose()?,
            description: self.description,
            project: self.project,
            tags,
            estimate_minutes: self.estimate_minutes,
            explicit_duration_minutes: self.explicit_duration_minutes,
            remark: self.remark,
            state: self
                .state
                .parse::<SessionState>()
                .map_err(|err| invalid(err.to_string()))?,
            parent_session_id: self.parent_session_id.map(id).transpose()?,
            continues_session_id: self.continues_session_id.map(id).transpose()?,
        })
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- start_time/end_time: RFC 3339 UTC (e.g. '2025-01-15T10:30:00.000Z')
            -- end_time NULL: still open (working, or paused by an interruption)
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                description TEXT NOT NULL,
                project TEXT,
                estimate_minutes INTEGER,
                explicit_duration_minutes INTEGER,
                remark TEXT,
                state TEXT NOT NULL
                    CHECK (state IN ('working', 'paused', 'completed', 'abandoned')),
                parent_session_id INTEGER,
                continues_session_id INTEGER,
                FOREIGN KEY (parent_session_id) REFERENCES sessions(id) ON DELETE CASCADE,
                FOREIGN KEY (continues_session_id) REFERENCES sessions(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_time);
            CREATE INDEX IF NOT EXISTS idx_sessions_parent ON sessions(parent_session_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_continues ON sessions(continues_session_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_state ON sessions(state);

            CREATE TABLE IF NOT EXISTS session_tags (
                session_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY (session_id, tag),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_session_tags_tag ON session_tags(tag);
            ",
        )?;
        Ok(())
    }

    /// Lists every stored session ordered by start time.
    pub fn list_sessions(&self) -> Result<Vec<Session>, DbError> {
        self.query_sessions(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time ASC, id ASC"),
            [],
        )
    }

    fn query_sessions(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Session>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, SessionRow::from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            let row = row?;
            let tags = self.tags_for(row.id)?;
            sessions.push(row.into_session(tags)?);
        }
        Ok(sessions)
    }

    fn query_session(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<Session>, DbError> {
        let row = self
            .conn
            .query_row(sql, params, SessionRow::from_row)
            .optional()?;
        match row {
            Some(row) => {
                let tags = self.tags_for(row.id)?;
                Ok(Some(row.into_session(tags)?))
            }
            None => Ok(None),
        }
    }

    fn tags_for(&self, session_id: i64) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT tag FROM session_tags WHERE session_id = ? ORDER BY position ASC",
        )?;
        let rows = stmt.query_map([session_id], |row| row.get(0))?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    fn write_tags(conn: &Connection, session_id: i64, tags: &[String]) -> Result<(), DbError> {
        conn.execute("DELETE FROM session_tags WHERE session_id = ?", [session_id])?;
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO session_tags (session_id, position, tag) VALUES (?, ?, ?)",
        )?;
        for (position, tag) in tags.iter().enumerate() {
            let position = i64::try_from(position).unwrap_or(i64::MAX);
            stmt.execute(params![session_id, position, tag])?;
        }
        Ok(())
    }
}

impl SessionStore for Database {
    type Error = DbError;

    fn insert(&mut self, session: &NewSession) -> Result<SessionId, DbError> {
        let sp = self.conn.savepoint()?;
        sp.execute(
            "
            INSERT INTO sessions (start_time, end_time, description, project, estimate_minutes,
                explicit_duration_minutes, remark, state, parent_session_id, continues_session_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                format_timestamp(session.start_time),
                session.end_time.map(format_timestamp),
                session.description,
                session.project,
                session.estimate_minutes,
                session.explicit_duration_minutes,
                session.remark,
                session.state.as_str(),
                session.parent_session_id.map(SessionId::get),
                session.continues_session_id.map(SessionId::get),
            ],
        )?;
        let row_id = sp.last_insert_rowid();
        Self::write_tags(&sp, row_id, &session.tags)?;
        sp.commit()?;

        SessionId::new(row_id).map_err(|err| DbError::InvalidSessionRow {
            session_id: row_id,
            message: err.to_string(),
        })
    }

    fn update(&mut self, session: &Session) -> Result<(), DbError> {
        let sp = self.conn.savepoint()?;
        sp.execute(
            "
            UPDATE sessions
            SET start_time = ?, end_time = ?, description = ?, project = ?, estimate_minutes = ?,
                explicit_duration_minutes = ?, remark = ?, state = ?, parent_session_id = ?,
                continues_session_id = ?
            WHERE id = ?
            ",
            params![
                format_timestamp(session.start_time),
                session.end_time.map(format_timestamp),
                session.description,
                session.project,
                session.estimate_minutes,
                session.explicit_duration_minutes,
                session.remark,
                session.state.as_str(),
                session.parent_session_id.map(SessionId::get),
                session.continues_session_id.map(SessionId::get),
                session.id.get(),
            ],
        )?;
        Self::write_tags(&sp, session.id.get(), &session.tags)?;
        sp.commit()?;
        Ok(())
    }

    fn delete(&mut self, id: SessionId) -> Result<bool, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?", [id.get()])?;
        Ok(deleted > 0)
    }

    fn get_by_id(&self, id: SessionId) -> Result<Option<Session>, DbError> {
        self.query_session(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
            [id.get()],
        )
    }

    fn get_active(&self) -> Result<Option<Session>, DbError> {
        self.query_session(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE state = 'working' AND end_time IS NULL
                 ORDER BY start_time DESC, id DESC LIMIT 1"
            ),
            [],
        )
    }

    fn get_children(&self, parent: SessionId) -> Result<Vec<Session>, DbError> {
        self.query_sessions(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE parent_session_id = ?
                 ORDER BY start_time ASC, id ASC"
            ),
            [parent.get()],
        )
    }

    fn get_overlapping(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        exclude: Option<SessionId>,
    ) -> Result<Vec<Session>, DbError> {
        self.query_sessions(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE parent_session_id IS NULL
                   AND (?1 IS NULL OR id != ?1)
                   AND (end_time IS NULL OR end_time > ?2)
                   AND (?3 IS NULL OR start_time < ?3)
                 ORDER BY start_time ASC, id ASC"
            ),
            params![
                exclude.map(SessionId::get),
                format_timestamp(start),
                end.map(format_timestamp),
            ],
        )
    }

    fn get_continuation_chain(&self, root: SessionId) -> Result<Vec<Session>, DbError> {
        self.query_sessions(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE id = ?1 OR continues_session_id = ?1
                 ORDER BY start_time ASC, id ASC"
            ),
            [root.get()],
        )
    }

    fn list_paused(&self) -> Result<Vec<Session>, DbError> {
        self.query_sessions(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE state = 'paused'
                 ORDER BY start_time DESC, id DESC"
            ),
            [],
        )
    }

    fn list_top_level_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        self.query_sessions(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE parent_session_id IS NULL AND start_time >= ? AND start_time < ?
                 ORDER BY start_time ASC, id ASC"
            ),
            [format_timestamp(start), format_timestamp(end)],
        )
    }

    fn last_top_level_before(&self, at: DateTime<Utc>) -> Result<Option<Session>, DbError> {
        self.query_session(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE parent_session_id IS NULL AND start_time < ?
                 ORDER BY start_time DESC, id DESC LIMIT 1"
            ),
            [format_timestamp(at)],
        )
    }

    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        self.query_sessions(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE start_time >= ? AND start_time < ?
                 ORDER BY start_time ASC, id ASC"
            ),
            [format_timestamp(start), format_timestamp(end)],
        )
    }

    /// Runs `f` inside `BEGIN IMMEDIATE`, so the read-then-write checks of a
    /// command see no concurrent writer.
    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TrackError>,
    ) -> Result<T, TrackError> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|err| TrackError::store(DbError::from(err)))?;

        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|err| TrackError::store(DbError::from(err)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn parse_timestamp(timestamp: &str, session_id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            session_id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
