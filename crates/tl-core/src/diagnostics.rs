//! Line-tagged parse errors and warnings.

use std::fmt;

use chrono::NaiveTime;
use thiserror::Error;

use crate::types::SessionState;

/// What went wrong on a single line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("missing or invalid timestamp (expected [YYYY-MM-DD ]H:MM[:SS])")]
    MissingTimestamp,

    #[error("missing description")]
    MissingDescription,

    #[error("invalid project (expected @ followed by letters, digits, '_' or '-')")]
    InvalidProjectFormat,

    #[error("invalid tag (expected + followed by letters, digits, '_' or '-')")]
    InvalidTagFormat,

    #[error("invalid estimate (expected ~1h30m, ~2h or ~45m)")]
    InvalidEstimateFormat,

    #[error("invalid duration (expected (1h30m), (2h) or (45m))")]
    InvalidDurationFormat,

    #[error("malformed remark (expected '# ' followed by text)")]
    MalformedRemark,

    #[error("unexpected text after markers: {text:?}")]
    UnexpectedText { text: String },

    #[error("{marker} given more than once")]
    DuplicateMarker { marker: &'static str },

    /// A dedent that does not return to any enclosing indentation width.
    #[error("indentation does not match any enclosing entry")]
    InconsistentIndentation,

    /// An indented entry with nothing shallower above it.
    #[error("indented entry has no parent entry")]
    OrphanIndentation,

    #[error("cannot resolve {reference}")]
    UnresolvedReference { reference: String },

    #[error("@{marker} is only valid in a log file")]
    UnexpectedControlMarker { marker: &'static str },

    #[error("entry ends at or before its start")]
    EmptyInterval,

    #[error("'->{state}' needs an end time; only an interrupted entry may stay open")]
    StateRequiresEndTime { state: SessionState },
}

/// A fatal problem with one line of log notation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub const fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

/// Non-fatal observations made while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarningKind {
    /// A time-only line is earlier than the line before it.
    TimeWentBackward {
        previous: NaiveTime,
        current: NaiveTime,
    },
    /// A control line that closes no entry.
    DanglingControlMarker { marker: &'static str },
    /// Estimates are kept on chain roots only.
    EstimateOnContinuation,
}

impl fmt::Display for ParseWarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeWentBackward { previous, current } => write!(
                f,
                "time went backward from {previous} to {current}; assuming the next day"
            ),
            Self::DanglingControlMarker { marker } => {
                write!(f, "@{marker} does not close any entry")
            }
            Self::EstimateOnContinuation => {
                write!(f, "estimate ignored on a continuation; set it on the first entry")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number.
    pub line: usize,
    pub kind: ParseWarningKind,
}

impl ParseWarning {
    pub const fn new(line: usize, kind: ParseWarningKind) -> Self {
        Self { line, kind }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}
