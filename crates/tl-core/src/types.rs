//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Session IDs are positive row identifiers.
    #[error("session ID must be positive, got {value}")]
    NonPositiveSessionId { value: i64 },

    /// A session ID string was not a number.
    #[error("invalid session ID: {value}")]
    InvalidSessionId { value: String },

    /// Invalid session state value.
    #[error("invalid session state: {value}")]
    InvalidSessionState { value: String },
}

/// A persisted session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SessionId(i64);

impl SessionId {
    /// Creates a new ID after validation.
    pub const fn new(id: i64) -> Result<Self, ValidationError> {
        if id <= 0 {
            return Err(ValidationError::NonPositiveSessionId { value: id });
        }
        Ok(Self(id))
    }

    /// Returns the raw row identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for SessionId {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for i64 {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s.trim().parse().map_err(|_| ValidationError::InvalidSessionId {
            value: s.to_string(),
        })?;
        Self::new(value)
    }
}

/// Lifecycle state of a session.
///
/// `Working → {Paused, Completed, Abandoned}`, `Paused → {Working, Completed,
/// Abandoned}`. `Completed` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Working,
    Paused,
    Completed,
    Abandoned,
}

impl SessionState {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Working => matches!(next, Self::Paused | Self::Completed | Self::Abandoned),
            Self::Paused => matches!(next, Self::Working | Self::Completed | Self::Abandoned),
            Self::Completed | Self::Abandoned => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "working" => Ok(Self::Working),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(ValidationError::InvalidSessionState {
                value: s.to_string(),
            }),
        }
    }
}

/// Parses an estimate or duration body: `1h30m`, `2h` or `45m`.
///
/// Returns `None` for anything else, including `1h90m`-style bodies whose
/// minute part is written before the hour part.
pub fn parse_minutes(value: &str) -> Option<u32> {
    let (hours, rest) = match value.split_once('h') {
        Some((hours, rest)) => (Some(hours), rest),
        None => (None, value),
    };
    let minutes = match rest {
        "" => None,
        rest => Some(rest.strip_suffix('m')?),
    };
    if hours.is_none() && minutes.is_none() {
        return None;
    }

    let mut total: u32 = 0;
    if let Some(hours) = hours {
        total = parse_digits(hours)?.checked_mul(60)?;
    }
    if let Some(minutes) = minutes {
        total = total.checked_add(parse_digits(minutes)?)?;
    }
    Some(total)
}

fn parse_digits(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Formats minutes the way log notation writes them (`1h12m`, `2h`, `20m`).
#[must_use]
pub fn format_minutes(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h{m}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_rejects_non_positive() {
        assert!(SessionId::new(0).is_err());
        assert!(SessionId::new(-3).is_err());
        assert_eq!(SessionId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn session_id_from_str() {
        assert_eq!("42".parse::<SessionId>().unwrap().get(), 42);
        assert!("abc".parse::<SessionId>().is_err());
        assert!("0".parse::<SessionId>().is_err());
    }

    #[test]
    fn session_id_serde_rejects_zero() {
        let result: Result<SessionId, _> = serde_json::from_str("0");
        assert!(result.is_err());
        let parsed: SessionId = serde_json::from_str("12").unwrap();
        assert_eq!(parsed.get(), 12);
    }

    #[test]
    fn session_state_from_str() {
        assert_eq!(
            "paused".parse::<SessionState>().unwrap(),
            SessionState::Paused
        );
        assert!("stopped".parse::<SessionState>().is_err());
    }

    #[test]
    fn session_state_transitions() {
        use SessionState::{Abandoned, Completed, Paused, Working};

        assert!(Working.can_transition_to(Paused));
        assert!(Working.can_transition_to(Completed));
        assert!(Paused.can_transition_to(Working));
        assert!(Paused.can_transition_to(Abandoned));
        assert!(!Working.can_transition_to(Working));
        assert!(!Completed.can_transition_to(Working));
        assert!(!Abandoned.can_transition_to(Paused));
    }

    #[test]
    fn parse_minutes_accepts_notation_forms() {
        assert_eq!(parse_minutes("1h12m"), Some(72));
        assert_eq!(parse_minutes("2h"), Some(120));
        assert_eq!(parse_minutes("45m"), Some(45));
        assert_eq!(parse_minutes("0m"), Some(0));
    }

    #[test]
    fn parse_minutes_rejects_other_shapes() {
        for value in ["", "h", "m", "hm", "12", "1m2h", "1hh", "1h2", "m5", "1h2m3m"] {
            assert_eq!(parse_minutes(value), None, "{value:?} should be rejected");
        }
    }

    #[test]
    fn format_minutes_round_trips() {
        for minutes in [0, 5, 60, 72, 125, 600] {
            assert_eq!(parse_minutes(&format_minutes(minutes)), Some(minutes));
        }
        assert_eq!(format_minutes(72), "1h12m");
    }
}
