//! Line grammar: turns tokenized lines into raw entries.
//!
//! This stage enforces per-line marker rules, converts raw indentation widths
//! into nesting levels and attaches a full date to every clock time.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{ParseError, ParseErrorKind, ParseWarning, ParseWarningKind};
use crate::token::{ClockStamp, StateSuffix, TokenKind, TokenizedLine, tokenize, tokenize_fragment};
use crate::types::parse_minutes;

/// A reference to an earlier entry or session instead of a description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeRef {
    /// `@prev`: the most recently started top-level entry.
    Prev,
    /// `@N`: the N-th top-level entry, counting from 1.
    Index(usize),
    /// `@resume [description]`: the most recent matching paused entry.
    Paused { description: Option<String> },
}

impl ResumeRef {
    /// The marker as written in log notation.
    #[must_use]
    pub fn notation(&self) -> String {
        match self {
            Self::Prev => "@prev".to_string(),
            Self::Index(n) => format!("@{n}"),
            Self::Paused { description: None } => "@resume".to_string(),
            Self::Paused {
                description: Some(description),
            } => format!("@resume {description}"),
        }
    }
}

/// A line that only closes the entry before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMarker {
    End,
    Pause,
    Abandon,
}

impl ControlMarker {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::End => "end",
            Self::Pause => "pause",
            Self::Abandon => "abandon",
        }
    }

    fn from_token(value: &str) -> Option<Self> {
        match value {
            "end" => Some(Self::End),
            "pause" => Some(Self::Pause),
            "abandon" => Some(Self::Abandon),
            _ => None,
        }
    }
}

/// What an entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    Description(String),
    Resume(ResumeRef),
    /// Placeholder kept until end-times and parents are resolved.
    Control(ControlMarker),
}

/// Everything on a line after the timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryBody {
    pub subject: Subject,
    pub project: Option<String>,
    /// Tags in first-seen order, without duplicates.
    pub tags: Vec<String>,
    pub estimate_minutes: Option<u32>,
    pub explicit_duration_minutes: Option<u32>,
    pub remark: Option<String>,
}

impl Default for Subject {
    fn default() -> Self {
        Self::Description(String::new())
    }
}

impl EntryBody {
    /// A plain body with only a description.
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            subject: Subject::Description(description.into()),
            ..Self::default()
        }
    }

    pub const fn is_control(&self) -> bool {
        matches!(self.subject, Subject::Control(_))
    }

    /// The description, if the subject already is one.
    pub fn description(&self) -> Option<&str> {
        match &self.subject {
            Subject::Description(text) => Some(text),
            Subject::Resume(_) | Subject::Control(_) => None,
        }
    }
}

/// One parsed line of a log buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// 0-based position in the original line sequence. Blank, comment and
    /// failed lines count, so this stays valid after any filtering.
    pub line_index: usize,
    /// Nesting level: 0 for top-level entries, 1 for their interruptions, ...
    pub indent_depth: usize,
    pub timestamp: NaiveDateTime,
    pub body: EntryBody,
    pub state_suffix: Option<StateSuffix>,
}

impl RawEntry {
    /// 1-based line number for diagnostics.
    pub const fn line_number(&self) -> usize {
        self.line_index + 1
    }
}

/// Options for parsing a log buffer.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Date for clock times before the first dated line.
    pub default_date: NaiveDate,
}

/// Entries, errors and warnings of one buffer, in line order.
#[derive(Debug, Clone, Default)]
pub struct ParsedLines {
    pub entries: Vec<RawEntry>,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<ParseWarning>,
}

/// Parses every line of `text`.
///
/// A line that fails records its error and parsing moves on to the next line.
pub fn parse_lines(text: &str, options: &ParseOptions) -> ParsedLines {
    let mut parsed = ParsedLines::default();
    let mut levels = IndentLevels::default();
    let mut dates = DateTracker::new(options.default_date);

    for (line_index, line) in text.lines().enumerate() {
        let line_number = line_index + 1;
        let tokenized = match tokenize(line, line_number) {
            Ok(Some(tokenized)) => tokenized,
            Ok(None) => continue,
            Err(err) => {
                parsed.errors.push(err);
                continue;
            }
        };

        let entry = build_entry(&tokenized, line_index, &mut levels, &mut dates);
        match entry {
            Ok((entry, warning)) => {
                parsed.warnings.extend(warning);
                parsed.entries.push(entry);
            }
            Err(kind) => parsed.errors.push(ParseError::new(line_number, kind)),
        }
    }

    tracing::debug!(
        entries = parsed.entries.len(),
        errors = parsed.errors.len(),
        warnings = parsed.warnings.len(),
        "parsed log lines"
    );
    parsed
}

/// Parses an entry body typed without a timestamp, e.g. on the command line.
pub fn parse_fragment(text: &str) -> Result<EntryBody, ParseError> {
    let tokenized = tokenize_fragment(text)?;
    let (_, body) = build_body(&tokenized).map_err(|kind| ParseError::new(1, kind))?;
    if let Subject::Control(marker) = body.subject {
        return Err(ParseError::new(
            1,
            ParseErrorKind::UnexpectedControlMarker {
                marker: marker.as_str(),
            },
        ));
    }
    Ok(body)
}

fn build_entry(
    tokenized: &TokenizedLine,
    line_index: usize,
    levels: &mut IndentLevels,
    dates: &mut DateTracker,
) -> Result<(RawEntry, Option<ParseWarning>), ParseErrorKind> {
    let (stamp, body) = build_body(tokenized)?;
    let stamp = stamp.ok_or(ParseErrorKind::MissingTimestamp)?;
    let indent_depth = levels.level_for(tokenized.indent)?;
    let (timestamp, warning) = dates.resolve(stamp);

    let entry = RawEntry {
        line_index,
        indent_depth,
        timestamp,
        body,
        state_suffix: tokenized.state_suffix,
    };
    let warning = warning.map(|kind| ParseWarning::new(tokenized.line_number, kind));
    Ok((entry, warning))
}

fn build_body(tokenized: &TokenizedLine) -> Result<(Option<ClockStamp>, EntryBody), ParseErrorKind> {
    let mut stamp = None;
    let mut description = None;
    let mut resume = None;
    let mut control = None;
    let mut body = EntryBody::default();

    for token in &tokenized.tokens {
        match token.kind {
            TokenKind::Timestamp => stamp = ClockStamp::parse(&token.value),
            TokenKind::Description => description = Some(token.value.clone()),
            TokenKind::ResumeMarker => resume = Some(token.value.as_str()),
            TokenKind::ControlMarker => control = ControlMarker::from_token(&token.value),
            TokenKind::Project => set_once(&mut body.project, token.value.clone(), "project")?,
            TokenKind::Tag => {
                if !body.tags.contains(&token.value) {
                    body.tags.push(token.value.clone());
                }
            }
            TokenKind::Estimate => {
                let minutes =
                    parse_minutes(&token.value).ok_or(ParseErrorKind::InvalidEstimateFormat)?;
                set_once(&mut body.estimate_minutes, minutes, "estimate")?;
            }
            TokenKind::ExplicitDuration => {
                let minutes =
                    parse_minutes(&token.value).ok_or(ParseErrorKind::InvalidDurationFormat)?;
                set_once(&mut body.explicit_duration_minutes, minutes, "duration")?;
            }
            TokenKind::Remark => set_once(&mut body.remark, token.value.clone(), "remark")?,
        }
    }

    body.subject = match (resume, control) {
        (Some("prev"), _) => Subject::Resume(ResumeRef::Prev),
        (Some("resume"), _) => Subject::Resume(ResumeRef::Paused { description }),
        (Some(index), _) => match index.parse::<usize>() {
            Ok(n) if n > 0 => Subject::Resume(ResumeRef::Index(n)),
            _ => {
                return Err(ParseErrorKind::UnresolvedReference {
                    reference: format!("@{index}"),
                });
            }
        },
        (None, Some(marker)) => Subject::Control(marker),
        (None, None) => Subject::Description(description.ok_or(ParseErrorKind::MissingDescription)?),
    };
    Ok((stamp, body))
}

fn set_once<T>(slot: &mut Option<T>, value: T, marker: &'static str) -> Result<(), ParseErrorKind> {
    if slot.is_some() {
        return Err(ParseErrorKind::DuplicateMarker { marker });
    }
    *slot = Some(value);
    Ok(())
}

/// Maps raw indentation widths onto nesting levels.
///
/// Each open level remembers its width; a deeper line opens a new level and a
/// shallower line must land exactly on the width of an enclosing level.
#[derive(Debug, Default)]
struct IndentLevels {
    widths: Vec<usize>,
}

impl IndentLevels {
    fn level_for(&mut self, width: usize) -> Result<usize, ParseErrorKind> {
        let Some(&top) = self.widths.last() else {
            if width > 0 {
                return Err(ParseErrorKind::OrphanIndentation);
            }
            self.widths.push(0);
            return Ok(0);
        };

        if width > top {
            self.widths.push(width);
            return Ok(self.widths.len() - 1);
        }
        let Some(level) = self.widths.iter().rposition(|&w| w == width) else {
            return Err(ParseErrorKind::InconsistentIndentation);
        };
        self.widths.truncate(level + 1);
        Ok(level)
    }
}

/// Carries the running date from line to line.
#[derive(Debug)]
struct DateTracker {
    date: NaiveDate,
    previous: Option<NaiveDateTime>,
}

impl DateTracker {
    const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            previous: None,
        }
    }

    /// Full timestamp for a line; a time-only line earlier than its
    /// predecessor rolls over to the next day.
    fn resolve(&mut self, stamp: ClockStamp) -> (NaiveDateTime, Option<ParseWarningKind>) {
        let mut warning = None;
        let timestamp = if let Some(date) = stamp.date {
            self.date = date;
            date.and_time(stamp.time)
        } else {
            let candidate = self.date.and_time(stamp.time);
            match self.previous {
                Some(previous) if candidate < previous => {
                    warning = Some(ParseWarningKind::TimeWentBackward {
                        previous: previous.time(),
                        current: stamp.time,
                    });
                    self.date = previous.date().succ_opt().unwrap_or(previous.date());
                    self.date.and_time(stamp.time)
                }
                _ => candidate,
            }
        };
        self.previous = Some(timestamp);
        (timestamp, warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveTime;

    fn options() -> ParseOptions {
        ParseOptions {
            default_date: NaiveDate::from_ymd_opt(2025, 12, 30).unwrap(),
        }
    }

    fn at(date: (i32, u32, u32), h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn plain_entry_has_only_description() {
        let parsed = parse_lines("09:30 Fix bug", &options());
        assert!(parsed.errors.is_empty());
        let entry = &parsed.entries[0];
        assert_eq!(entry.timestamp, at((2025, 12, 30), 9, 30));
        assert_eq!(entry.body, EntryBody::described("Fix bug"));
        assert_eq!(entry.indent_depth, 0);
        assert_eq!(entry.state_suffix, None);
    }

    #[test]
    fn markers_fill_the_body() {
        let parsed = parse_lines(
            "08:00 Task A @project +code +code +review ~2h (45m) # first pass ->paused",
            &options(),
        );
        let body = &parsed.entries[0].body;
        assert_eq!(body.description(), Some("Task A"));
        assert_eq!(body.project.as_deref(), Some("project"));
        assert_eq!(body.tags, vec!["code".to_string(), "review".to_string()]);
        assert_eq!(body.estimate_minutes, Some(120));
        assert_eq!(body.explicit_duration_minutes, Some(45));
        assert_eq!(body.remark.as_deref(), Some("first pass"));
        assert_eq!(parsed.entries[0].state_suffix, Some(StateSuffix::Paused));
    }

    #[test]
    fn errors_keep_line_numbers_and_parsing_continues() {
        let text = "09:00 First\n\nbroken line\n# comment\n10:00 Second @a @b\n11:00 Third";
        let parsed = parse_lines(text, &options());

        let lines: Vec<usize> = parsed.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 5]);
        assert_eq!(parsed.errors[0].kind, ParseErrorKind::MissingTimestamp);
        assert_eq!(
            parsed.errors[1].kind,
            ParseErrorKind::DuplicateMarker { marker: "project" }
        );

        let indices: Vec<usize> = parsed.entries.iter().map(|e| e.line_index).collect();
        assert_eq!(indices, vec![0, 5]);
    }

    #[test]
    fn missing_description_is_an_error() {
        let parsed = parse_lines("09:00 @admin +x", &options());
        assert_eq!(parsed.errors[0].kind, ParseErrorKind::MissingDescription);
    }

    #[test]
    fn resume_subjects() {
        let text = "09:00 @prev\n09:10 @2\n09:20 @resume\n09:30 @resume Task A @p";
        let parsed = parse_lines(text, &options());
        let subjects: Vec<Subject> = parsed.entries.into_iter().map(|e| e.body.subject).collect();
        assert_eq!(
            subjects,
            vec![
                Subject::Resume(ResumeRef::Prev),
                Subject::Resume(ResumeRef::Index(2)),
                Subject::Resume(ResumeRef::Paused { description: None }),
                Subject::Resume(ResumeRef::Paused {
                    description: Some("Task A".to_string())
                }),
            ]
        );
    }

    #[test]
    fn zero_index_reference_is_an_error() {
        let parsed = parse_lines("09:00 @0", &options());
        assert_eq!(
            parsed.errors[0].kind,
            ParseErrorKind::UnresolvedReference {
                reference: "@0".to_string()
            }
        );
    }

    #[test]
    fn control_lines_become_placeholders() {
        let parsed = parse_lines("09:00 Work\n10:00 @pause", &options());
        assert_eq!(
            parsed.entries[1].body.subject,
            Subject::Control(ControlMarker::Pause)
        );
        assert!(parsed.entries[1].body.is_control());
    }

    #[test]
    fn indentation_widths_become_levels() {
        let text = "09:00 A\n    09:10 B\n        09:20 C\n    09:30 D\n09:40 E\n\t09:50 F";
        let parsed = parse_lines(text, &options());
        assert!(parsed.errors.is_empty());
        let depths: Vec<usize> = parsed.entries.iter().map(|e| e.indent_depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 1, 0, 1]);
    }

    #[test]
    fn dedent_to_unknown_width_is_an_error() {
        let text = "09:00 A\n    09:10 B\n  09:20 C";
        let parsed = parse_lines(text, &options());
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 3);
        assert_eq!(parsed.errors[0].kind, ParseErrorKind::InconsistentIndentation);
    }

    #[test]
    fn indented_first_entry_is_an_orphan() {
        let parsed = parse_lines("  09:00 A\n09:10 B", &options());
        assert_eq!(parsed.errors[0].kind, ParseErrorKind::OrphanIndentation);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].indent_depth, 0);
    }

    #[test]
    fn dated_lines_set_the_running_date() {
        let text = "2026-01-05 09:00 A\n10:00 B\n2026-01-07 08:00 C\n09:00 D";
        let parsed = parse_lines(text, &options());
        let stamps: Vec<NaiveDateTime> = parsed.entries.iter().map(|e| e.timestamp).collect();
        assert_eq!(
            stamps,
            vec![
                at((2026, 1, 5), 9, 0),
                at((2026, 1, 5), 10, 0),
                at((2026, 1, 7), 8, 0),
                at((2026, 1, 7), 9, 0),
            ]
        );
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn backward_time_warns_and_rolls_over() {
        let parsed = parse_lines("23:30 Late fix\n00:15 Still going", &options());
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.entries[1].timestamp, at((2025, 12, 31), 0, 15));
        assert_eq!(
            parsed.warnings,
            vec![ParseWarning::new(
                2,
                ParseWarningKind::TimeWentBackward {
                    previous: NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
                    current: NaiveTime::from_hms_opt(0, 15, 0).unwrap(),
                }
            )]
        );
    }

    #[test]
    fn explicit_date_going_backward_does_not_warn() {
        let parsed = parse_lines("2026-01-05 09:00 A\n2026-01-04 09:00 B", &options());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn fragment_parses_body() {
        let body = parse_fragment("Write docs @tl +docs ~1h").unwrap();
        assert_eq!(body.description(), Some("Write docs"));
        assert_eq!(body.project.as_deref(), Some("tl"));
        assert_eq!(body.estimate_minutes, Some(60));

        let body = parse_fragment("@prev").unwrap();
        assert_eq!(body.subject, Subject::Resume(ResumeRef::Prev));
    }

    #[test]
    fn fragment_rejects_control_markers() {
        let err = parse_fragment("@end").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnexpectedControlMarker { marker: "end" }
        );
    }

    #[test]
    fn resume_ref_notation() {
        assert_eq!(ResumeRef::Index(3).notation(), "@3");
        assert_eq!(
            ResumeRef::Paused {
                description: Some("Task A".to_string())
            }
            .notation(),
            "@resume Task A"
        );
    }
}
