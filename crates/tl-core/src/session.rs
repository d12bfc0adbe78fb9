//! Persisted sessions and the store interface.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TimeRange, TrackError};
use crate::grammar::EntryBody;
use crate::types::{SessionId, SessionState};

/// A stored work session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub description: String,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub estimate_minutes: Option<u32>,
    pub explicit_duration_minutes: Option<u32>,
    pub remark: Option<String>,
    pub state: SessionState,
    pub parent_session_id: Option<SessionId>,
    pub continues_session_id: Option<SessionId>,
}

impl Session {
    /// Working with no end: the one session the clock is running for.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Working && self.end_time.is_none()
    }

    /// Paused with no end: waiting on one of its interruptions.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.state == SessionState::Paused && self.end_time.is_none()
    }

    #[must_use]
    pub fn chain_root(&self) -> SessionId {
        self.continues_session_id.unwrap_or(self.id)
    }

    #[must_use]
    pub const fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Wall-clock time from start to end, or to `now` while still open.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }

    /// Moves to `next`, enforcing the state machine.
    pub fn transition(&mut self, next: SessionState) -> Result<(), TrackError> {
        if !self.state.can_transition_to(next) {
            return Err(TrackError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// A session before the store has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub description: String,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub estimate_minutes: Option<u32>,
    pub explicit_duration_minutes: Option<u32>,
    pub remark: Option<String>,
    pub state: SessionState,
    pub parent_session_id: Option<SessionId>,
    pub continues_session_id: Option<SessionId>,
}

impl NewSession {
    /// Builds a session from a body whose subject is already a description.
    #[must_use]
    pub fn from_body(body: EntryBody, start_time: DateTime<Utc>, state: SessionState) -> Self {
        let description = body.description().unwrap_or_default().to_string();
        Self {
            start_time,
            end_time: None,
            description,
            project: body.project,
            tags: body.tags,
            estimate_minutes: body.estimate_minutes,
            explicit_duration_minutes: body.explicit_duration_minutes,
            remark: body.remark,
            state,
            parent_session_id: None,
            continues_session_id: None,
        }
    }

    #[must_use]
    pub fn with_id(self, id: SessionId) -> Session {
        Session {
            id,
            start_time: self.start_time,
            end_time: self.end_time,
            description: self.description,
            project: self.project,
            tags: self.tags,
            estimate_minutes: self.estimate_minutes,
            explicit_duration_minutes: self.explicit_duration_minutes,
            remark: self.remark,
            state: self.state,
            parent_session_id: self.parent_session_id,
            continues_session_id: self.continues_session_id,
        }
    }
}

/// Storage the domain logic runs against.
///
/// Listing methods return sessions ordered by start time, oldest first,
/// unless stated otherwise.
pub trait SessionStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn insert(&mut self, session: &NewSession) -> Result<SessionId, Self::Error>;

    fn update(&mut self, session: &Session) -> Result<(), Self::Error>;

    /// Removes a session and its interruptions. Returns whether it existed.
    fn delete(&mut self, id: SessionId) -> Result<bool, Self::Error>;

    fn get_by_id(&self, id: SessionId) -> Result<Option<Session>, Self::Error>;

    /// The session that is `Working` with no end time, if any.
    fn get_active(&self) -> Result<Option<Session>, Self::Error>;

    fn get_children(&self, parent: SessionId) -> Result<Vec<Session>, Self::Error>;

    /// Top-level sessions intersecting `[start, end)`; a missing end on
    /// either side is unbounded.
    fn get_overlapping(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        exclude: Option<SessionId>,
    ) -> Result<Vec<Session>, Self::Error>;

    /// The root and every session continuing it.
    fn get_continuation_chain(&self, root: SessionId) -> Result<Vec<Session>, Self::Error>;

    /// Paused sessions, most recently started first.
    fn list_paused(&self) -> Result<Vec<Session>, Self::Error>;

    /// Top-level sessions started in `[start, end)`.
    fn list_top_level_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, Self::Error>;

    /// The latest top-level session started strictly before `at`.
    fn last_top_level_before(&self, at: DateTime<Utc>) -> Result<Option<Session>, Self::Error>;

    /// All sessions started in `[start, end)`.
    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, Self::Error>;

    /// Runs `f` as one unit: every write is kept if it returns `Ok`, none if
    /// it returns `Err`.
    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TrackError>,
    ) -> Result<T, TrackError>
    where
        Self: Sized;
}

/// Converts store results into [`TrackError`].
pub(crate) trait StoreResultExt<T> {
    fn tracked(self) -> Result<T, TrackError>;
}

impl<T, E> StoreResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn tracked(self) -> Result<T, TrackError> {
        self.map_err(TrackError::store)
    }
}

/// Totals for one continuation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub root: SessionId,
    pub members: usize,
    pub elapsed_minutes: i64,
    pub estimate_minutes: Option<u32>,
    pub complete: bool,
}

/// Summarizes a chain as returned by
/// [`SessionStore::get_continuation_chain`]. `None` for an empty chain.
#[must_use]
pub fn summarize_chain(chain: &[Session], now: DateTime<Utc>) -> Option<ChainSummary> {
    let root = chain
        .iter()
        .find(|session| session.continues_session_id.is_none())
        .or_else(|| chain.first())?;
    let elapsed: Duration = chain.iter().map(|session| session.elapsed(now)).sum();

    Some(ChainSummary {
        root: root.id,
        members: chain.len(),
        elapsed_minutes: elapsed.num_minutes(),
        estimate_minutes: root.estimate_minutes,
        complete: chain.iter().all(|session| session.state.is_terminal()),
    })
}
