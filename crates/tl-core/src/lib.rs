//! Core domain logic for timelog.
//!
//! This crate contains:
//! - Log notation: tokenizer, line grammar and the temporal resolver
//! - Continuations: `@prev`, `@N` and `@resume` resolution
//! - Scheduling: overlap validation and the live-command state machine
//! - Import: all-or-nothing storage of a parsed buffer

pub mod clock;
pub mod diagnostics;
pub mod error;
pub mod grammar;
pub mod import;
pub mod overlap;
pub mod resume;
pub mod session;
pub mod temporal;
pub mod token;
pub mod tracking;
pub mod types;

#[cfg(test)]
mod memory;

pub use clock::{day_range, local_day, to_utc};
pub use diagnostics::{ParseError, ParseErrorKind, ParseWarning, ParseWarningKind};
pub use error::{TimeRange, TrackError, TrackWarning};
pub use grammar::{
    ControlMarker, EntryBody, ParseOptions, RawEntry, ResumeRef, Subject, parse_fragment,
    parse_lines,
};
pub use import::{ImportReport, ParsedFile, parse_file, resolve_and_import};
pub use overlap::{Adjusted, OverlapPolicy, find_overlap, validate_and_adjust};
pub use session::{ChainSummary, NewSession, Session, SessionStore, summarize_chain};
pub use temporal::{Continuation, LogEntry};
pub use token::{StateSuffix, TokenKind, tokenize};
pub use tracking::{
    Abandoned, Resumed, Started, TrackContext, abandon, delete, interrupt, pause, resume, start,
    stop, validate_abandon_time, validate_interrupt_time, validate_pause_time,
    validate_resume_time, validate_start_time, validate_stop_time,
};
pub use types::{SessionId, SessionState, ValidationError, format_minutes, parse_minutes};
