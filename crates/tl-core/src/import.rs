//! Whole-buffer parsing and all-or-nothing import.

use std::collections::HashMap;

use chrono::TimeZone;

use crate::clock::{local_day, to_utc};
use crate::diagnostics::{ParseError, ParseWarning};
use crate::error::{TrackError, TrackWarning};
use crate::grammar::{ParseOptions, ParsedLines, Subject, parse_lines};
use crate::overlap::{OverlapPolicy, validate_and_adjust};
use crate::resume::{resolve_against_store, resolve_in_buffer};
use crate::session::{NewSession, SessionStore, StoreResultExt};
use crate::temporal::{Continuation, LogEntry, resolve, settle_states, without_controls};
use crate::types::{SessionId, SessionState};

/// A fully resolved buffer. Only importable when `errors` is empty.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub entries: Vec<LogEntry>,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedFile {
    #[must_use]
    pub fn is_importable(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs every pure stage over `text`: grammar, temporal resolution, state
/// assignment and in-buffer resume resolution.
pub fn parse_file(text: &str, options: &ParseOptions) -> ParsedFile {
    let ParsedLines {
        entries,
        mut errors,
        mut warnings,
    } = parse_lines(text, options);

    let mut resolved = resolve(entries);
    let (state_errors, state_warnings) = settle_states(&mut resolved);
    errors.extend(state_errors);
    warnings.extend(state_warnings);

    let mut entries = without_controls(resolved);
    let (resume_errors, resume_warnings) = resolve_in_buffer(&mut entries);
    errors.extend(resume_errors);
    warnings.extend(resume_warnings);

    errors.sort_by_key(|err| err.line);
    warnings.sort_by_key(|warning| warning.line);
    ParsedFile {
        entries,
        errors,
        warnings,
    }
}

/// Sessions created by an import, keyed by source line.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// `(line_index, id)` in file order.
    pub imported: Vec<(usize, SessionId)>,
    pub warnings: Vec<TrackWarning>,
}

impl ImportReport {
    #[must_use]
    pub fn session_for_line(&self, line_index: usize) -> Option<SessionId> {
        self.imported
            .iter()
            .find(|(line, _)| *line == line_index)
            .map(|(_, id)| *id)
    }
}

/// Stores every entry of `parsed` in one transaction.
///
/// Any parse error rejects the whole file. Local clock times are read in
/// `tz`. Top-level entries pass the overlap validator; a small overlap is
/// corrected like a live start.
pub fn resolve_and_import<S: SessionStore, Tz: TimeZone>(
    parsed: ParsedFile,
    store: &mut S,
    tz: &Tz,
    policy: OverlapPolicy,
) -> Result<ImportReport, TrackError> {
    if !parsed.is_importable() {
        return Err(TrackError::ImportRejected(parsed.errors));
    }

    let report = store.atomically(|store| {
        let mut report = ImportReport::default();
        let mut ids: HashMap<usize, SessionId> = HashMap::new();
        let line_id = |ids: &HashMap<usize, SessionId>, line: usize| {
            ids.get(&line)
                .copied()
                .ok_or_else(|| TrackError::UnresolvedReference {
                    reference: format!("line {}", line + 1),
                })
        };

        for entry in parsed.entries {
            let line_index = entry.line_index();
            let start = to_utc(tz, entry.raw.timestamp)?;
            let end = entry.end_time.map(|end| to_utc(tz, end)).transpose()?;
            let parent = entry
                .parent_line_index
                .map(|line| line_id(&ids, line))
                .transpose()?;

            let mut body = entry.raw.body;
            let mut continues = match entry.continues {
                Some(Continuation::Line(line)) => Some(line_id(&ids, line)?),
                Some(Continuation::Session(id)) => Some(id),
                None => None,
            };
            let mut state = entry.state;
            if matches!(body.subject, Subject::Resume(_)) {
                let resolution =
                    resolve_against_store(store, &mut body, start, &local_day(tz, start))?;
                continues = resolution.continues;
                report.warnings.extend(resolution.warnings);
                if let Some(mut referent) = resolution.completes {
                    referent.transition(SessionState::Completed)?;
                    store.update(&referent).tracked()?;
                }
            }

            let start = if parent.is_none() {
                let adjusted = validate_and_adjust(store, start, end, None, policy)?;
                report.warnings.extend(adjusted.warning);
                adjusted.start
            } else {
                start
            };
            if end.is_some() && state == SessionState::Working {
                state = SessionState::Completed;
            }

            let mut new = NewSession::from_body(body, start, state);
            new.end_time = end;
            new.parent_session_id = parent;
            new.continues_session_id = continues;
            let id = store.insert(&new).tracked()?;
            ids.insert(line_index, id);
            report.imported.push((line_index, id));
        }
        Ok(report)
    })?;

    tracing::debug!(
        sessions = report.imported.len(),
        warnings = report.warnings.len(),
        "import committed"
    );
    Ok(report)
}
