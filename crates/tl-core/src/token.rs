//! Log notation tokenizer.
//!
//! One line of log notation looks like
//!
//! ```text
//! [YYYY-MM-DD ]H:MM[:SS]  (@N | @prev | @resume [text] | @end | @pause | @abandon | text)
//!     [@project] [+tag]* [~estimate] [(duration)] [# remark] [->state]
//! ```
//!
//! Scanning works on an immutable `Cursor`: every sub-parser takes a cursor
//! and hands back the token it read together with a new cursor, so no string
//! is ever mutated in place.

use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{ParseError, ParseErrorKind};
use crate::types::{SessionState, parse_minutes};

/// Date prefix and clock time. Range checks happen after the regex match.
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d{4})-(\d{2})-(\d{2})[ \t]+)?(\d{1,2}):(\d{2})(?::(\d{2}))?").unwrap()
});

/// Characters that start a marker when they follow whitespace.
const MARKER_STARTS: [char; 5] = ['@', '+', '~', '(', '#'];

/// Kind of a token. Every kind is handled explicitly by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Timestamp,
    Description,
    Project,
    Tag,
    Estimate,
    ExplicitDuration,
    Remark,
    /// `@prev`, `@<N>` or `@resume`; the value has no `@`.
    ResumeMarker,
    /// `@end`, `@pause` or `@abandon`; the value has no `@`.
    ControlMarker,
}

impl TokenKind {
    /// Position of the kind in canonical line order.
    const fn canonical_rank(self) -> u8 {
        match self {
            Self::Timestamp => 0,
            Self::ResumeMarker | Self::ControlMarker => 1,
            Self::Description => 2,
            Self::Project => 3,
            Self::Tag => 4,
            Self::Estimate => 5,
            Self::ExplicitDuration => 6,
            Self::Remark => 7,
        }
    }
}

/// A token with its marker sigil stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// Byte offset of the token (sigil included) within the line.
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            offset,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Timestamp | TokenKind::Description => f.write_str(&self.value),
            TokenKind::ResumeMarker | TokenKind::ControlMarker | TokenKind::Project => {
                write!(f, "@{}", self.value)
            }
            TokenKind::Tag => write!(f, "+{}", self.value),
            TokenKind::Estimate => write!(f, "~{}", self.value),
            TokenKind::ExplicitDuration => write!(f, "({})", self.value),
            TokenKind::Remark => write!(f, "# {}", self.value),
        }
    }
}

/// Terminal state written as `->state` at the end of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSuffix {
    Paused,
    Completed,
    Abandoned,
}

impl StateSuffix {
    const ALL: [Self; 3] = [Self::Paused, Self::Completed, Self::Abandoned];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    #[must_use]
    pub const fn state(self) -> SessionState {
        match self {
            Self::Paused => SessionState::Paused,
            Self::Completed => SessionState::Completed,
            Self::Abandoned => SessionState::Abandoned,
        }
    }
}

/// The tokens of one non-blank, non-comment line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedLine {
    /// 1-based line number.
    pub line_number: usize,
    /// Count of leading whitespace characters.
    pub indent: usize,
    pub tokens: Vec<Token>,
    pub state_suffix: Option<StateSuffix>,
}

impl TokenizedLine {
    /// Renders the line in canonical marker order with space indentation.
    ///
    /// Tokenizing the result yields the same token kinds and values.
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut tokens: Vec<&Token> = self.tokens.iter().collect();
        tokens.sort_by_key(|token| token.kind.canonical_rank());

        let mut out = " ".repeat(self.indent);
        let body = tokens
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&body);
        if let Some(suffix) = self.state_suffix {
            out.push_str(" ->");
            out.push_str(suffix.as_str());
        }
        out
    }
}

/// Date and time as written at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockStamp {
    pub date: Option<NaiveDate>,
    pub time: NaiveTime,
}

impl ClockStamp {
    /// Parses a complete timestamp token value.
    pub fn parse(value: &str) -> Option<Self> {
        match match_timestamp(value) {
            Some((stamp, len)) if len == value.len() => Some(stamp),
            _ => None,
        }
    }
}

/// Matches a timestamp at the start of `text`.
///
/// Returns the stamp and the matched byte length. The match must end at
/// whitespace or end of input, and the date and time must be in range; a
/// shape-only match such as `99:99` is not a timestamp.
pub fn match_timestamp(text: &str) -> Option<(ClockStamp, usize)> {
    let caps = TIMESTAMP_RE.captures(text)?;
    let len = caps.get(0)?.end();
    if !text[len..].chars().next().is_none_or(char::is_whitespace) {
        return None;
    }

    let number = |idx: usize| -> Option<u32> { caps.get(idx).map(|m| m.as_str().parse().ok())? };
    let date = match caps.get(1) {
        Some(year) => Some(NaiveDate::from_ymd_opt(
            year.as_str().parse().ok()?,
            number(2)?,
            number(3)?,
        )?),
        None => None,
    };
    let seconds = match caps.get(6) {
        Some(_) => number(6)?,
        None => 0,
    };
    let time = NaiveTime::from_hms_opt(number(4)?, number(5)?, seconds)?;
    Some((ClockStamp { date, time }, len))
}

/// Immutable scanning position over a line.
#[derive(Debug, Clone, Copy)]
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(self) -> Option<char> {
        self.rest().chars().next()
    }

    const fn advance(self, bytes: usize) -> Self {
        Self {
            src: self.src,
            pos: self.pos + bytes,
        }
    }

    fn skip_whitespace(self) -> Self {
        let rest = self.rest();
        self.advance(rest.len() - rest.trim_start().len())
    }

    fn at_boundary(self) -> bool {
        self.peek().is_none_or(char::is_whitespace)
    }

    fn take_while(self, pred: impl Fn(char) -> bool) -> (&'a str, Self) {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        (&rest[..len], self.advance(len))
    }
}

type Scan<'a> = Result<(Option<Token>, Cursor<'a>), ParseErrorKind>;

/// Tokenizes one line of log notation.
///
/// Blank lines and comments (`#` as the first non-whitespace character) give
/// `Ok(None)`.
pub fn tokenize(line: &str, line_number: usize) -> Result<Option<TokenizedLine>, ParseError> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let indent = line.chars().take_while(|c| c.is_whitespace()).count();
    let (body, state_suffix) = split_state_suffix(line.trim_end());

    let tokens = scan_line(Cursor::new(body).skip_whitespace())
        .map_err(|kind| ParseError::new(line_number, kind))?;

    Ok(Some(TokenizedLine {
        line_number,
        indent,
        tokens,
        state_suffix,
    }))
}

/// Tokenizes an entry body without a timestamp, as typed on the command line.
pub fn tokenize_fragment(text: &str) -> Result<TokenizedLine, ParseError> {
    let (body, state_suffix) = split_state_suffix(text.trim());
    let mut tokens = Vec::new();
    scan_body(Cursor::new(body), &mut tokens).map_err(|kind| ParseError::new(1, kind))?;
    Ok(TokenizedLine {
        line_number: 1,
        indent: 0,
        tokens,
        state_suffix,
    })
}

fn split_state_suffix(line: &str) -> (&str, Option<StateSuffix>) {
    for suffix in StateSuffix::ALL {
        let marker = format!("->{}", suffix.as_str());
        if let Some(head) = line.strip_suffix(marker.as_str()) {
            if head.ends_with(char::is_whitespace) {
                return (head.trim_end(), Some(suffix));
            }
        }
    }
    (line, None)
}

fn scan_line(cursor: Cursor<'_>) -> Result<Vec<Token>, ParseErrorKind> {
    let (stamp, after) = timestamp(cursor)?;
    let mut tokens = vec![stamp];
    scan_body(after.skip_whitespace(), &mut tokens)?;
    Ok(tokens)
}

fn scan_body(cursor: Cursor<'_>, tokens: &mut Vec<Token>) -> Result<(), ParseErrorKind> {
    let (subject, after) = subject(cursor)?;
    tokens.extend(subject);
    markers(after, tokens)
}

fn timestamp(cursor: Cursor<'_>) -> Result<(Token, Cursor<'_>), ParseErrorKind> {
    let (_, len) = match_timestamp(cursor.rest()).ok_or(ParseErrorKind::MissingTimestamp)?;
    let token = Token::new(TokenKind::Timestamp, &cursor.rest()[..len], cursor.pos);
    Ok((token, cursor.advance(len)))
}

/// Reads the resume marker, control marker or description after the timestamp.
fn subject(cursor: Cursor<'_>) -> Result<(Vec<Token>, Cursor<'_>), ParseErrorKind> {
    if cursor.peek() == Some('@') {
        let (word, after) = cursor.advance(1).take_while(|c| !c.is_whitespace());
        let is_index = !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit());
        let marker = |kind| (vec![Token::new(kind, word, cursor.pos)], after);
        match word {
            "prev" => return Ok(marker(TokenKind::ResumeMarker)),
            _ if is_index => return Ok(marker(TokenKind::ResumeMarker)),
            "end" | "pause" | "abandon" => return Ok(marker(TokenKind::ControlMarker)),
            "resume" => {
                let (mut tokens, after) = marker(TokenKind::ResumeMarker);
                let (text, after) = description(after.skip_whitespace());
                tokens.extend(text);
                return Ok((tokens, after));
            }
            // Anything else is a project; the description scan below stops
            // at it straight away and the grammar reports what is missing.
            _ => {}
        }
    }
    let (text, after) = description(cursor);
    Ok((text.into_iter().collect(), after))
}

/// Consumes free text up to the first marker start that follows whitespace.
fn description(cursor: Cursor<'_>) -> (Option<Token>, Cursor<'_>) {
    let rest = cursor.rest();
    let mut previous_is_space = true;
    let mut end = rest.len();
    for (idx, c) in rest.char_indices() {
        if previous_is_space && MARKER_STARTS.contains(&c) {
            end = idx;
            break;
        }
        previous_is_space = c.is_whitespace();
    }

    let text = rest[..end].trim_end();
    let token = (!text.is_empty()).then(|| Token::new(TokenKind::Description, text, cursor.pos));
    (token, cursor.advance(end))
}

fn markers(mut cursor: Cursor<'_>, tokens: &mut Vec<Token>) -> Result<(), ParseErrorKind> {
    loop {
        cursor = cursor.skip_whitespace();
        let Some(c) = cursor.peek() else {
            return Ok(());
        };
        let (token, next) = match c {
            '@' => name_marker(
                cursor,
                TokenKind::Project,
                ParseErrorKind::InvalidProjectFormat,
            )?,
            '+' => name_marker(cursor, TokenKind::Tag, ParseErrorKind::InvalidTagFormat)?,
            '~' => estimate(cursor)?,
            '(' => duration(cursor)?,
            '#' => remark(cursor)?,
            _ => {
                return Err(ParseErrorKind::UnexpectedText {
                    text: cursor.rest().to_string(),
                });
            }
        };
        tokens.extend(token);
        cursor = next;
    }
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

const fn is_span_char(c: char) -> bool {
    c.is_ascii_digit() || c == 'h' || c == 'm'
}

fn name_marker(cursor: Cursor<'_>, kind: TokenKind, err: ParseErrorKind) -> Scan<'_> {
    let (name, after) = cursor.advance(1).take_while(is_name_char);
    if name.is_empty() || !after.at_boundary() {
        return Err(err);
    }
    Ok((Some(Token::new(kind, name, cursor.pos)), after))
}

fn estimate(cursor: Cursor<'_>) -> Scan<'_> {
    let (span, after) = cursor.advance(1).take_while(is_span_char);
    if !after.at_boundary() || parse_minutes(span).is_none() {
        return Err(ParseErrorKind::InvalidEstimateFormat);
    }
    Ok((
        Some(Token::new(TokenKind::Estimate, span, cursor.pos)),
        after,
    ))
}

fn duration(cursor: Cursor<'_>) -> Scan<'_> {
    let (span, after) = cursor.advance(1).take_while(is_span_char);
    if after.peek() != Some(')') {
        return Err(ParseErrorKind::InvalidDurationFormat);
    }
    let after = after.advance(1);
    if !after.at_boundary() || parse_minutes(span).is_none() {
        return Err(ParseErrorKind::InvalidDurationFormat);
    }
    Ok((
        Some(Token::new(TokenKind::ExplicitDuration, span, cursor.pos)),
        after,
    ))
}

/// `# ` and everything after it.
fn remark(cursor: Cursor<'_>) -> Scan<'_> {
    let Some(text) = cursor.rest().strip_prefix("# ") else {
        return Err(ParseErrorKind::MalformedRemark);
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseErrorKind::MalformedRemark);
    }
    let end = cursor.rest().len();
    Ok((
        Some(Token::new(TokenKind::Remark, text, cursor.pos)),
        cursor.advance(end),
    ))
}
