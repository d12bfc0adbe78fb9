//! Errors and warnings of live commands and imports.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use crate::diagnostics::ParseError;
use crate::types::{SessionId, SessionState};

/// A stored session's time range, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start.format("%Y-%m-%d %H:%M:%S");
        match self.end {
            Some(end) => write!(f, "{start} - {}", end.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{start} - (open)"),
        }
    }
}

/// Why a live command or an import was refused.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("no active session")]
    NoActiveSession,

    #[error("the active session is not an interruption; use stop or pause")]
    NoActiveInterruption,

    #[error("session {id} is not an interruption of {expected}")]
    CurrentTaskNotInterruption { id: SessionId, expected: SessionId },

    #[error("session {id} is an interruption; resume or stop it first")]
    InterruptionInProgress { id: SessionId },

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: SessionId,
        from: SessionState,
        to: SessionState,
    },

    #[error("{at} is in the future (now {now})")]
    TimeInFuture {
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("{at} is not after the start of session {id} ({start})")]
    TimeBeforeSessionStart {
        id: SessionId,
        at: DateTime<Utc>,
        start: DateTime<Utc>,
    },

    #[error("proposed {proposed} overlaps active session {id} ({existing})")]
    OverlapsActiveSession {
        id: SessionId,
        proposed: TimeRange,
        existing: TimeRange,
    },

    #[error("proposed {proposed} overlaps session {id} ({existing})")]
    OverlapsExistingSession {
        id: SessionId,
        proposed: TimeRange,
        existing: TimeRange,
    },

    #[error("cannot resolve {reference}")]
    UnresolvedReference { reference: String },

    #[error("local time {0} does not exist or is ambiguous in this time zone")]
    InvalidLocalTime(NaiveDateTime),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("import rejected: {} error(s), first: {}", .0.len(), first_error(.0))]
    ImportRejected(Vec<ParseError>),

    #[error("storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TrackError {
    /// Wraps a store backend error.
    pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(err))
    }
}

fn first_error(errors: &[ParseError]) -> String {
    errors
        .first()
        .map_or_else(String::new, ToString::to_string)
}

/// Non-fatal outcomes the user should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackWarning {
    /// A start was moved past a session that ended moments after it.
    StartAdjusted {
        requested: DateTime<Utc>,
        adjusted: DateTime<Utc>,
        conflict: SessionId,
    },
    /// `@resume` found no paused session; a fresh session was started.
    UnmatchedResume { reference: String },
    /// An estimate given on a continuation was dropped.
    EstimateOnContinuation,
}

impl fmt::Display for TrackWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartAdjusted {
                requested,
                adjusted,
                conflict,
            } => write!(
                f,
                "start moved from {} to {} to follow session {conflict}",
                requested.format("%H:%M:%S"),
                adjusted.format("%H:%M:%S")
            ),
            Self::UnmatchedResume { reference } => {
                write!(f, "{reference} matched no paused session; started a new one")
            }
            Self::EstimateOnContinuation => {
                write!(f, "estimate ignored on a continuation; it stays on the first session")
            }
        }
    }
}
