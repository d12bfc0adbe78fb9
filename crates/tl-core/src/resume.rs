//! Resolution of `@prev`, `@N` and `@resume` into continuation links.
//!
//! Only the referent's description is carried over. Project, tags and
//! estimate have to be given again on the resuming line.

use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::diagnostics::{ParseError, ParseErrorKind, ParseWarning, ParseWarningKind};
use crate::error::{TrackError, TrackWarning};
use crate::grammar::{EntryBody, ResumeRef, Subject};
use crate::session::{Session, SessionStore, StoreResultExt};
use crate::temporal::{Continuation, LogEntry};
use crate::types::{SessionId, SessionState};

/// What a `@resume` line asks for. Unset fields match anything.
#[derive(Debug, Clone, Copy)]
struct PausedQuery<'a> {
    description: Option<&'a str>,
    project: Option<&'a str>,
    tags: &'a [String],
}

impl<'a> PausedQuery<'a> {
    fn new(description: Option<&'a str>, body: &'a EntryBody) -> Self {
        Self {
            description,
            project: body.project.as_deref(),
            tags: &body.tags,
        }
    }

    fn matches(&self, description: &str, project: Option<&str>, tags: &[String]) -> bool {
        self.description.is_none_or(|wanted| wanted == description)
            && self.project.is_none_or(|wanted| project == Some(wanted))
            && (self.tags.is_empty()
                || (self.tags.len() == tags.len() && self.tags.iter().all(|t| tags.contains(t))))
    }
}

/// Resolves resume markers against earlier entries of the same buffer.
///
/// Expects settled entries with control lines already removed. A `@resume`
/// with no paused match in the buffer is left as is for the store stage.
pub fn resolve_in_buffer(entries: &mut [LogEntry]) -> (Vec<ParseError>, Vec<ParseWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut top_level: Vec<usize> = Vec::new();

    for pos in 0..entries.len() {
        if let Subject::Resume(reference) = &entries[pos].raw.body.subject {
            let reference = reference.clone();
            let line = entries[pos].raw.line_number();
            let referent = match &reference {
                ResumeRef::Index(n) => n.checked_sub(1).and_then(|i| top_level.get(i)).copied(),
                ResumeRef::Prev => top_level.last().copied(),
                ResumeRef::Paused { description } => {
                    let found = find_paused_in_buffer(entries, pos, description.as_deref());
                    if found.is_none() {
                        tracing::debug!(line, "no paused entry in buffer; deferring to store");
                    }
                    found
                }
            };

            match referent {
                Some(referent) => match link_in_buffer(entries, pos, referent) {
                    Ok(warning) => warnings.extend(warning),
                    Err(kind) => errors.push(ParseError::new(line, kind)),
                },
                None if matches!(reference, ResumeRef::Paused { .. }) => {}
                None => errors.push(ParseError::new(
                    line,
                    ParseErrorKind::UnresolvedReference {
                        reference: reference.notation(),
                    },
                )),
            }
        }

        if entries[pos].is_top_level() {
            top_level.push(pos);
        }
    }

    (errors, warnings)
}

fn find_paused_in_buffer(entries: &[LogEntry], pos: usize, description: Option<&str>) -> Option<usize> {
    let query = PausedQuery::new(description, &entries[pos].raw.body);
    (0..pos).rev().find(|&candidate| {
        let entry = &entries[candidate];
        let body = &entry.raw.body;
        entry.state == SessionState::Paused
            && entry.end_time.is_some()
            && body
                .description()
                .is_some_and(|text| query.matches(text, body.project.as_deref(), &body.tags))
    })
}

fn link_in_buffer(
    entries: &mut [LogEntry],
    pos: usize,
    referent: usize,
) -> Result<Option<ParseWarning>, ParseErrorKind> {
    let Some(description) = entries[referent].raw.body.description().map(str::to_string) else {
        return Err(ParseErrorKind::UnresolvedReference {
            reference: format!(
                "reference to line {}, which is itself an unresolved @resume",
                entries[referent].raw.line_number()
            ),
        });
    };
    let root = entries[referent]
        .continues
        .unwrap_or(Continuation::Line(entries[referent].line_index()));

    if entries[referent].state == SessionState::Paused && entries[referent].end_time.is_some() {
        entries[referent].state = SessionState::Completed;
    }

    let entry = &mut entries[pos];
    entry.raw.body.subject = Subject::Description(description);
    entry.continues = Some(root);
    Ok(entry
        .raw
        .body
        .estimate_minutes
        .take()
        .map(|_| ParseWarning::new(entry.raw.line_number(), ParseWarningKind::EstimateOnContinuation)))
}

/// Outcome of resolving a body against stored sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreResolution {
    /// Root of the chain the new session joins.
    pub continues: Option<SessionId>,
    /// Paused referent whose segment the new session ends.
    pub completes: Option<Session>,
    pub warnings: Vec<TrackWarning>,
}

/// Resolves the subject of `body` against the store, for a session starting
/// at `start` on the local day `day`. Afterwards the subject is always a
/// description.
pub fn resolve_against_store<S: SessionStore>(
    store: &S,
    body: &mut EntryBody,
    start: DateTime<Utc>,
    day: &Range<DateTime<Utc>>,
) -> Result<StoreResolution, TrackError> {
    let reference = match &body.subject {
        Subject::Description(_) => return Ok(StoreResolution::default()),
        Subject::Control(marker) => {
            return Err(ParseError::new(
                1,
                ParseErrorKind::UnexpectedControlMarker {
                    marker: marker.as_str(),
                },
            )
            .into());
        }
        Subject::Resume(reference) => reference.clone(),
    };

    let referent = match &reference {
        ResumeRef::Index(n) => {
            let sessions = store
                .list_top_level_between(day.start, start.min(day.end))
                .tracked()?;
            n.checked_sub(1).and_then(|i| sessions.into_iter().nth(i))
        }
        ResumeRef::Prev => store.last_top_level_before(start).tracked()?,
        ResumeRef::Paused { description } => {
            let query = PausedQuery::new(description.as_deref(), body);
            store
                .list_paused()
                .tracked()?
                .into_iter()
                .filter(|session| session.end_time.is_some() && session.start_time < start)
                .find(|session| {
                    query.matches(&session.description, session.project.as_deref(), &session.tags)
                })
        }
    };

    let mut resolution = StoreResolution::default();
    let Some(referent) = referent else {
        let notation = reference.notation();
        let ResumeRef::Paused { description } = reference else {
            return Err(TrackError::UnresolvedReference {
                reference: notation,
            });
        };
        tracing::warn!(reference = %notation, "no paused session to resume");
        resolution.warnings.push(TrackWarning::UnmatchedResume {
            reference: notation,
        });
        body.subject = Subject::Description(description.unwrap_or_else(|| "resume".to_string()));
        return Ok(resolution);
    };

    tracing::debug!(referent = %referent.id, root = %referent.chain_root(), "resolved continuation");
    body.subject = Subject::Description(referent.description.clone());
    if body.estimate_minutes.take().is_some() {
        resolution.warnings.push(TrackWarning::EstimateOnContinuation);
    }
    resolution.continues = Some(referent.chain_root());
    if referent.state == SessionState::Paused && referent.end_time.is_some() {
        resolution.completes = Some(referent);
    }
    Ok(resolution)
}
