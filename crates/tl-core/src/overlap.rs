//! Overlap detection between top-level sessions.

use chrono::{DateTime, Duration, Utc};

use crate::error::{TimeRange, TrackError, TrackWarning};
use crate::session::{Session, SessionStore, StoreResultExt};
use crate::types::SessionId;

/// Default window in which a conflict is corrected instead of rejected.
pub const DEFAULT_TOLERANCE_SECS: u32 = 60;

/// How close a new start may land inside a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapPolicy {
    pub tolerance: Duration,
}

impl OverlapPolicy {
    #[must_use]
    pub fn from_secs(secs: u32) -> Self {
        Self {
            tolerance: Duration::seconds(i64::from(secs)),
        }
    }
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        Self::from_secs(DEFAULT_TOLERANCE_SECS)
    }
}

/// The start that was accepted, possibly moved forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjusted {
    pub start: DateTime<Utc>,
    pub warning: Option<TrackWarning>,
}

/// Half-open ranges intersect; a missing end is unbounded.
#[must_use]
pub fn ranges_overlap(
    a_start: DateTime<Utc>,
    a_end: Option<DateTime<Utc>>,
    b_start: DateTime<Utc>,
    b_end: Option<DateTime<Utc>>,
) -> bool {
    b_end.is_none_or(|end| a_start < end) && a_end.is_none_or(|end| b_start < end)
}

/// The top-level session in the way of `[start, end)`, if any. An open
/// session wins over closed ones, then the earliest.
pub fn find_overlap<S: SessionStore>(
    store: &S,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    exclude: Option<SessionId>,
) -> Result<Option<Session>, TrackError> {
    let conflicts = store.get_overlapping(start, end, exclude).tracked()?;
    let open = conflicts.iter().position(|session| session.end_time.is_none());
    Ok(match open {
        Some(pos) => conflicts.into_iter().nth(pos),
        None => conflicts.into_iter().next(),
    })
}

/// Checks `[start, end)` against stored top-level sessions.
///
/// A finished session that started earlier and overlaps the new start by
/// less than the tolerance pushes the start to one second after its end.
/// Every other conflict is an error.
pub fn validate_and_adjust<S: SessionStore>(
    store: &S,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    exclude: Option<SessionId>,
    policy: OverlapPolicy,
) -> Result<Adjusted, TrackError> {
    let Some(conflict) = find_overlap(store, start, end, exclude)? else {
        return Ok(Adjusted {
            start,
            warning: None,
        });
    };

    let Some(conflict_end) = conflict.end_time else {
        return Err(conflict_error(&conflict, start, end));
    };
    if conflict.start_time >= start || conflict_end - start >= policy.tolerance {
        return Err(conflict_error(&conflict, start, end));
    }

    let adjusted = conflict_end + Duration::seconds(1);
    if end.is_some_and(|end| adjusted >= end) {
        return Err(conflict_error(&conflict, start, end));
    }
    if let Some(next) = find_overlap(store, adjusted, end, exclude)? {
        return Err(conflict_error(&next, adjusted, end));
    }

    tracing::warn!(
        requested = %start,
        adjusted = %adjusted,
        conflict = %conflict.id,
        "start adjusted past a just-finished session"
    );
    Ok(Adjusted {
        start: adjusted,
        warning: Some(TrackWarning::StartAdjusted {
            requested: start,
            adjusted,
            conflict: conflict.id,
        }),
    })
}

fn conflict_error(
    conflict: &Session,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> TrackError {
    let proposed = TimeRange { start, end };
    if conflict.end_time.is_none() {
        TrackError::OverlapsActiveSession {
            id: conflict.id,
            proposed,
            existing: conflict.range(),
        }
    } else {
        TrackError::OverlapsExistingSession {
            id: conflict.id,
            proposed,
            existing: conflict.range(),
        }
    }
}
