//! End-time inference, interruption parents and entry states.
//!
//! Both passes run over the same unfiltered entry list and key parents by
//! `line_index`, so dropping control placeholders afterwards cannot shift a
//! parent link.

use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{ParseError, ParseErrorKind, ParseWarning, ParseWarningKind};
use crate::grammar::{ControlMarker, RawEntry, Subject};
use crate::types::{SessionId, SessionState};

/// Where a continuation points: the chain root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continuation {
    /// Root is another entry of the same buffer, by `line_index`.
    Line(usize),
    /// Root is an already stored session.
    Session(SessionId),
}

/// A raw entry with its time range, parent and state resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub raw: RawEntry,
    pub end_time: Option<NaiveDateTime>,
    pub parent_line_index: Option<usize>,
    pub continues: Option<Continuation>,
    pub state: SessionState,
}

impl LogEntry {
    const fn unresolved(raw: RawEntry) -> Self {
        Self {
            raw,
            end_time: None,
            parent_line_index: None,
            continues: None,
            state: SessionState::Working,
        }
    }

    pub const fn line_index(&self) -> usize {
        self.raw.line_index
    }

    pub const fn depth(&self) -> usize {
        self.raw.indent_depth
    }

    pub const fn is_control(&self) -> bool {
        self.raw.body.is_control()
    }

    pub const fn is_top_level(&self) -> bool {
        self.raw.indent_depth == 0
    }
}

/// Resolves end-times, parents and default states. Order is preserved.
///
/// An entry ends after its explicit duration, or else when the next entry at
/// the same or a shallower depth starts. Its parent is the nearest earlier
/// entry exactly one level up.
pub fn resolve(entries: Vec<RawEntry>) -> Vec<LogEntry> {
    let mut resolved: Vec<LogEntry> = entries.into_iter().map(LogEntry::unresolved).collect();
    infer_end_times(&mut resolved);
    link_parents(&mut resolved);
    default_states(&mut resolved);
    resolved
}

fn infer_end_times(entries: &mut [LogEntry]) {
    // Positions still waiting for a successor, depth strictly increasing.
    let mut waiting: Vec<usize> = Vec::new();
    for pos in 0..entries.len() {
        let depth = entries[pos].depth();
        let timestamp = entries[pos].raw.timestamp;
        while let Some(&top) = waiting.last() {
            if entries[top].depth() < depth {
                break;
            }
            waiting.pop();
            entries[top].end_time = Some(timestamp);
        }
        waiting.push(pos);
    }

    for entry in entries.iter_mut() {
        if let Some(minutes) = entry.raw.body.explicit_duration_minutes {
            entry.end_time = Some(entry.raw.timestamp + Duration::minutes(i64::from(minutes)));
        }
    }
}

fn link_parents(entries: &mut [LogEntry]) {
    let controls: HashSet<usize> = entries
        .iter()
        .filter(|entry| entry.is_control())
        .map(LogEntry::line_index)
        .collect();

    // Most recent line index seen at each depth.
    let mut latest: Vec<Option<usize>> = Vec::new();
    for entry in entries.iter_mut() {
        let depth = entry.depth();
        latest.truncate(depth);
        latest.resize(depth, None);

        entry.parent_line_index = depth
            .checked_sub(1)
            .and_then(|up| latest[up])
            .filter(|parent| !controls.contains(parent));
        latest.push(Some(entry.line_index()));
    }
}

/// Closed entries are completed; of the open ones the deepest is working and
/// the ones it interrupts are paused.
fn default_states(entries: &mut [LogEntry]) {
    let mut deepest_open = None;
    for (pos, entry) in entries.iter_mut().enumerate() {
        if entry.is_control() || entry.end_time.is_some() {
            entry.state = SessionState::Completed;
        } else {
            entry.state = SessionState::Paused;
            deepest_open = Some(pos);
        }
    }
    if let Some(pos) = deepest_open {
        entries[pos].state = SessionState::Working;
    }
}

/// Applies `->state` suffixes and control lines, then checks every range.
pub fn settle_states(entries: &mut [LogEntry]) -> (Vec<ParseError>, Vec<ParseWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for pos in 0..entries.len() {
        let Subject::Control(marker) = entries[pos].raw.body.subject else {
            continue;
        };
        match closed_by_control(entries, pos) {
            Some(target) if entries[target].raw.state_suffix.is_none() => {
                entries[target].state = match marker {
                    ControlMarker::End => SessionState::Completed,
                    ControlMarker::Pause => SessionState::Paused,
                    ControlMarker::Abandon => SessionState::Abandoned,
                };
            }
            Some(_) => {}
            None => warnings.push(ParseWarning::new(
                entries[pos].raw.line_number(),
                ParseWarningKind::DanglingControlMarker {
                    marker: marker.as_str(),
                },
            )),
        }
    }

    for entry in entries.iter_mut().filter(|entry| !entry.is_control()) {
        let line = entry.raw.line_number();
        if let Some(suffix) = entry.raw.state_suffix {
            let state = suffix.state();
            let interrupted = entry.end_time.is_none() && entry.state == SessionState::Paused;
            if entry.end_time.is_some() || (interrupted && state == SessionState::Paused) {
                entry.state = state;
            } else {
                errors.push(ParseError::new(
                    line,
                    ParseErrorKind::StateRequiresEndTime { state },
                ));
            }
        }
        if entry.end_time.is_some_and(|end| end <= entry.raw.timestamp) {
            errors.push(ParseError::new(line, ParseErrorKind::EmptyInterval));
        }
    }

    (errors, warnings)
}

/// The real entry a control line closes: the nearest earlier entry at the
/// same depth with nothing shallower in between.
fn closed_by_control(entries: &[LogEntry], pos: usize) -> Option<usize> {
    let depth = entries[pos].depth();
    for candidate in (0..pos).rev() {
        let entry = &entries[candidate];
        if entry.depth() < depth {
            return None;
        }
        if entry.depth() == depth {
            return (!entry.is_control()).then_some(candidate);
        }
    }
    None
}

/// Drops control placeholders. Only call after [`resolve`] and
/// [`settle_states`].
pub fn without_controls(entries: Vec<LogEntry>) -> Vec<LogEntry> {
    entries
        .into_iter()
        .filter(|entry| !entry.is_control())
        .collect()
}
