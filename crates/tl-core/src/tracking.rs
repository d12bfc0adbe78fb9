//! Live commands: start, stop, pause, resume, interrupt, abandon, delete.
//!
//! Every operation reads the active session inside its own transaction and
//! takes the current time from [`TrackContext`], never from the system clock.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::clock::local_day;
use crate::error::{TrackError, TrackWarning};
use crate::grammar::EntryBody;
use crate::overlap::{OverlapPolicy, validate_and_adjust};
use crate::resume::resolve_against_store;
use crate::session::{NewSession, Session, SessionStore, StoreResultExt};
use crate::types::{SessionId, SessionState};

/// Inputs every live operation shares.
#[derive(Debug, Clone, Copy)]
pub struct TrackContext<'a, Tz: TimeZone> {
    pub now: DateTime<Utc>,
    /// Zone that decides what "today" means for `@N`.
    pub tz: &'a Tz,
    pub policy: OverlapPolicy,
}

/// A newly created session and what happened on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub session: Session,
    /// A paused session that this one continues and thereby completed.
    pub completed: Option<Session>,
    pub warnings: Vec<TrackWarning>,
}

/// Sessions changed by ending an interruption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resumed {
    pub interruption: Session,
    pub parent: Session,
}

/// Result of abandoning the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abandoned {
    pub session: Session,
    /// The interrupted parent, now working again.
    pub parent: Option<Session>,
}

pub fn validate_start_time(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), TrackError> {
    if at > now {
        return Err(TrackError::TimeInFuture { at, now });
    }
    Ok(())
}

pub fn validate_stop_time(
    active: &Session,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TrackError> {
    ensure_after_start(active, at, now)
}

pub fn validate_pause_time(
    active: &Session,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TrackError> {
    ensure_after_start(active, at, now)
}

pub fn validate_resume_time(
    interruption: &Session,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TrackError> {
    ensure_after_start(interruption, at, now)
}

/// An interruption has to start after the session it interrupts.
pub fn validate_interrupt_time(
    parent: &Session,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TrackError> {
    ensure_after_start(parent, at, now)
}

pub fn validate_abandon_time(
    active: &Session,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TrackError> {
    ensure_after_start(active, at, now)
}

fn ensure_after_start(
    session: &Session,
    at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), TrackError> {
    validate_start_time(at, now)?;
    if at <= session.start_time {
        return Err(TrackError::TimeBeforeSessionStart {
            id: session.id,
            at,
            start: session.start_time,
        });
    }
    Ok(())
}

/// Starts a top-level session at `at`.
///
/// With an explicit duration the session is recorded as already completed.
pub fn start<S: SessionStore, Tz: TimeZone>(
    store: &mut S,
    body: EntryBody,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<Started, TrackError> {
    validate_start_time(at, ctx.now)?;
    store.atomically(|store| create(store, body, at, None, ctx))
}

/// Starts an interruption of the active session, which is paused meanwhile.
pub fn interrupt<S: SessionStore, Tz: TimeZone>(
    store: &mut S,
    body: EntryBody,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<Started, TrackError> {
    store.atomically(|store| {
        let parent = active(store)?;
        validate_interrupt_time(&parent, at, ctx.now)?;
        create(store, body, at, Some(parent), ctx)
    })
}

fn create<S: SessionStore, Tz: TimeZone>(
    store: &mut S,
    mut body: EntryBody,
    at: DateTime<Utc>,
    parent: Option<Session>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<Started, TrackError> {
    let day = local_day(ctx.tz, at);
    let resolution = resolve_against_store(store, &mut body, at, &day)?;
    let mut warnings = resolution.warnings;

    let end = body
        .explicit_duration_minutes
        .map(|minutes| at + Duration::minutes(i64::from(minutes)));
    if let Some(end) = end {
        validate_start_time(end, ctx.now)?;
    }

    let exclude = match &parent {
        Some(parent) => Some(top_level_ancestor(store, parent)?),
        None => None,
    };
    let adjusted = validate_and_adjust(store, at, end, exclude, ctx.policy)?;
    warnings.extend(adjusted.warning);

    let completed = match resolution.completes {
        Some(mut referent) => {
            referent.transition(SessionState::Completed)?;
            store.update(&referent).tracked()?;
            Some(referent)
        }
        None => None,
    };

    let state = if end.is_some() {
        SessionState::Completed
    } else {
        SessionState::Working
    };
    let mut new = NewSession::from_body(body, adjusted.start, state);
    new.end_time = end;
    new.parent_session_id = parent.as_ref().map(|parent| parent.id);
    new.continues_session_id = resolution.continues;

    // A finished interruption leaves its parent running.
    if let Some(mut parent) = parent.filter(|_| end.is_none()) {
        parent.transition(SessionState::Paused)?;
        store.update(&parent).tracked()?;
    }

    let id = store.insert(&new).tracked()?;
    tracing::debug!(%id, start = %new.start_time, "session created");
    Ok(Started {
        session: new.with_id(id),
        completed,
        warnings,
    })
}

/// Stops the active session and any interrupted sessions above it.
///
/// Returns every closed session, innermost first.
pub fn stop<S: SessionStore, Tz: TimeZone>(
    store: &mut S,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<Vec<Session>, TrackError> {
    store.atomically(|store| {
        let mut current = active(store)?;
        validate_stop_time(&current, at, ctx.now)?;

        let mut closed = Vec::new();
        loop {
            current.transition(SessionState::Completed)?;
            current.end_time = Some(at);
            store.update(&current).tracked()?;
            let parent_id = current.parent_session_id;
            closed.push(current);

            let Some(parent_id) = parent_id else { break };
            let parent = fetch(store, parent_id)?;
            if !parent.is_interrupted() {
                break;
            }
            current = parent;
        }
        Ok(closed)
    })
}

/// Pauses the active top-level session until it is continued with `@resume`.
pub fn pause<S: SessionStore, Tz: TimeZone>(
    store: &mut S,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<Session, TrackError> {
    store.atomically(|store| {
        let mut current = active(store)?;
        if current.parent_session_id.is_some() {
            return Err(TrackError::InterruptionInProgress { id: current.id });
        }
        validate_pause_time(&current, at, ctx.now)?;
        current.transition(SessionState::Paused)?;
        current.end_time = Some(at);
        store.update(&current).tracked()?;
        Ok(current)
    })
}

/// Ends the active interruption and puts its parent back to work.
pub fn resume<S: SessionStore, Tz: TimeZone>(
    store: &mut S,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<Resumed, TrackError> {
    store.atomically(|store| {
        let mut interruption = active(store)?;
        let Some(parent_id) = interruption.parent_session_id else {
            return Err(TrackError::NoActiveInterruption);
        };
        let mut parent = fetch(store, parent_id)?;
        if !parent.is_interrupted() {
            return Err(TrackError::CurrentTaskNotInterruption {
                id: interruption.id,
                expected: parent.id,
            });
        }
        validate_resume_time(&interruption, at, ctx.now)?;

        interruption.transition(SessionState::Completed)?;
        interruption.end_time = Some(at);
        parent.transition(SessionState::Working)?;
        store.update(&interruption).tracked()?;
        store.update(&parent).tracked()?;
        Ok(Resumed {
            interruption,
            parent,
        })
    })
}

/// Abandons the active session. An abandoned interruption hands the clock
/// back to its parent.
pub fn abandon<S: SessionStore, Tz: TimeZone>(
    store: &mut S,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<Abandoned, TrackError> {
    store.atomically(|store| {
        let mut session = active(store)?;
        validate_abandon_time(&session, at, ctx.now)?;
        session.transition(SessionState::Abandoned)?;
        session.end_time = Some(at);
        store.update(&session).tracked()?;

        let parent = reactivate_parent(store, &session)?;
        Ok(Abandoned { session, parent })
    })
}

/// Deletes a session and its interruptions.
pub fn delete<S: SessionStore>(store: &mut S, id: SessionId) -> Result<Session, TrackError> {
    store.atomically(|store| {
        let session = fetch(store, id)?;
        if session.is_active() {
            reactivate_parent(store, &session)?;
        }
        store.delete(id).tracked()?;
        tracing::debug!(%id, "session deleted");
        Ok(session)
    })
}

fn reactivate_parent<S: SessionStore>(
    store: &mut S,
    child: &Session,
) -> Result<Option<Session>, TrackError> {
    let Some(parent_id) = child.parent_session_id else {
        return Ok(None);
    };
    let mut parent = fetch(store, parent_id)?;
    if !parent.is_interrupted() {
        return Ok(None);
    }
    parent.transition(SessionState::Working)?;
    store.update(&parent).tracked()?;
    Ok(Some(parent))
}

fn active<S: SessionStore>(store: &S) -> Result<Session, TrackError> {
    store.get_active().tracked()?.ok_or(TrackError::NoActiveSession)
}

fn fetch<S: SessionStore>(store: &S, id: SessionId) -> Result<Session, TrackError> {
    store
        .get_by_id(id)
        .tracked()?
        .ok_or(TrackError::SessionNotFound(id))
}

fn top_level_ancestor<S: SessionStore>(store: &S, session: &Session) -> Result<SessionId, TrackError> {
    let mut current = session.clone();
    while let Some(parent_id) = current.parent_session_id {
        current = fetch(store, parent_id)?;
    }
    Ok(current.id)
}
