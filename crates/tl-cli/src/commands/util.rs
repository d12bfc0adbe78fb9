//! Shared utilities for CLI commands.

use std::collections::HashMap;
use std::fmt::Display;
use std::ops::Range;
use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use regex::Regex;
use tl_core::{EntryBody, Session, SessionId, TrackContext, format_minutes, parse_fragment};

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Local clock time with an optional date: `9:05`, `09:05:30`, `2025-01-15 9:05`.
static CLOCK_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d{4}-\d{2}-\d{2})\s+)?(\d{1,2}):(\d{2})(?::(\d{2}))?$").unwrap()
});

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Resolves an `--at` value, defaulting to `ctx.now`.
pub fn resolve_at<Tz: TimeZone>(
    at: Option<&str>,
    ctx: &TrackContext<'_, Tz>,
) -> anyhow::Result<DateTime<Utc>> {
    at.map_or(Ok(ctx.now), |at| parse_datetime(at.trim(), ctx.now, ctx.tz))
}

/// Parse a datetime string as local clock time, ISO 8601 or relative time.
///
/// Supports:
/// - Clock time today: "9:05", "09:05:30"
/// - Local date and time: "2026-01-15 10:30"
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime<Tz: TimeZone>(
    s: &str,
    now: DateTime<Utc>,
    tz: &Tz,
) -> anyhow::Result<DateTime<Utc>> {
    if let Some(caps) = CLOCK_TIME_RE.captures(s) {
        let date = match caps.get(1) {
            Some(date) => NaiveDate::parse_from_str(date.as_str(), "%Y-%m-%d")
                .with_context(|| format!("invalid date in {s:?}"))?,
            None => now.with_timezone(tz).date_naive(),
        };
        let number = |idx: usize| caps.get(idx).map_or(Ok(0), |m| m.as_str().parse::<u32>());
        let time = NaiveTime::from_hms_opt(number(2)?, number(3)?, number(4)?)
            .with_context(|| format!("invalid clock time: {s}"))?;
        return Ok(tl_core::to_utc(tz, date.and_time(time))?);
    }

    // Try ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try relative time: "N hours/minutes/days/weeks ago"
    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid time: {s}. Use H:MM, YYYY-MM-DD H:MM, ISO 8601 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// Parses command-line words as an entry body.
pub fn parse_notation(words: &[String]) -> anyhow::Result<EntryBody> {
    let text = words.join(" ");
    parse_fragment(&text).map_err(|err| anyhow::anyhow!("invalid notation {text:?}: {}", err.kind))
}

/// The UTC range of `date` in `tz`, or of today when `date` is `None`.
pub fn day_bounds<Tz: TimeZone>(
    date: Option<NaiveDate>,
    ctx: &TrackContext<'_, Tz>,
) -> anyhow::Result<Range<DateTime<Utc>>> {
    let date = date.unwrap_or_else(|| ctx.now.with_timezone(ctx.tz).date_naive());
    tl_core::day_range(ctx.tz, date).with_context(|| format!("{date} has no local midnight"))
}

/// Local wall-clock time, with seconds only when they are set.
pub fn format_clock<Tz>(tz: &Tz, at: DateTime<Utc>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let local = at.with_timezone(tz);
    if local.second() == 0 {
        local.format("%H:%M").to_string()
    } else {
        local.format("%H:%M:%S").to_string()
    }
}

/// Whole minutes of a duration as log notation writes them.
pub fn format_elapsed(elapsed: Duration) -> String {
    format_minutes(u32::try_from(elapsed.num_minutes().max(0)).unwrap_or(u32::MAX))
}

/// Description followed by the session's markers, in log-notation order.
pub fn describe(session: &Session) -> String {
    let mut text = session.description.clone();
    if let Some(project) = &session.project {
        text.push_str(&format!(" @{project}"));
    }
    for tag in &session.tags {
        text.push_str(&format!(" +{tag}"));
    }
    if let Some(estimate) = session.estimate_minutes {
        text.push_str(&format!(" ~{}", format_minutes(estimate)));
    }
    if let Some(duration) = session.explicit_duration_minutes {
        text.push_str(&format!(" ({})", format_minutes(duration)));
    }
    if let Some(remark) = &session.remark {
        text.push_str(&format!(" # {remark}"));
    }
    text
}

/// Orders sessions as a forest: each session followed by its interruptions,
/// siblings by start time. Sessions whose parent is missing are roots.
pub fn session_tree(sessions: Vec<Session>) -> Vec<(usize, Session)> {
    let ids: Vec<SessionId> = sessions.iter().map(|session| session.id).collect();
    let mut children: HashMap<Option<SessionId>, Vec<Session>> = HashMap::new();
    for session in sessions {
        let parent = session.parent_session_id.filter(|parent| ids.contains(parent));
        children.entry(parent).or_default().push(session);
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|session| (session.start_time, session.id));
    }

    let mut ordered = Vec::new();
    let mut stack: Vec<(usize, Session)> = children
        .remove(&None)
        .unwrap_or_default()
        .into_iter()
        .rev()
        .map(|session| (0, session))
        .collect();
    while let Some((depth, session)) = stack.pop() {
        if let Some(kids) = children.remove(&Some(session.id)) {
            stack.extend(kids.into_iter().rev().map(|kid| (depth + 1, kid)));
        }
        ordered.push((depth, session));
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::FixedOffset;
    use tl_core::{NewSession, OverlapPolicy, SessionState};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0).unwrap()
    }

    fn session(id: i64, start_hour: u32, parent: Option<i64>) -> Session {
        NewSession {
            start_time: Utc.with_ymd_and_hms(2025, 3, 14, start_hour, 0, 0).unwrap(),
            end_time: None,
            description: format!("task {id}"),
            project: None,
            tags: Vec::new(),
            estimate_minutes: None,
            explicit_duration_minutes: None,
            remark: None,
            state: SessionState::Completed,
            parent_session_id: parent.map(|p| SessionId::new(p).unwrap()),
            continues_session_id: None,
        }
        .with_id(SessionId::new(id).unwrap())
    }

    #[test]
    fn parses_clock_times_in_local_zone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let parsed = parse_datetime("9:05", now(), &tz).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 14, 7, 5, 0).unwrap());

        let parsed = parse_datetime("2025-03-01 09:05:30", now(), &tz).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 1, 7, 5, 30).unwrap());
    }

    #[test]
    fn parses_rfc3339_and_relative_times() {
        let parsed = parse_datetime("2025-03-14T10:30:00Z", now(), &Utc).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap());

        let parsed = parse_datetime("90 minutes ago", now(), &Utc).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 14, 13, 30, 0).unwrap());

        let parsed = parse_datetime("1 hour ago", now(), &Utc).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 14, 14, 0, 0).unwrap());
    }

    #[test]
    fn rejects_unknown_time_formats() {
        assert!(parse_datetime("yesterday", now(), &Utc).is_err());
        assert!(parse_datetime("25:00", now(), &Utc).is_err());
        assert!(parse_datetime("999999999 weeks ago", now(), &Utc).is_err());
    }

    #[test]
    fn resolve_at_defaults_to_now() {
        let ctx = TrackContext {
            now: now(),
            tz: &Utc,
            policy: OverlapPolicy::default(),
        };
        assert_eq!(resolve_at(None, &ctx).unwrap(), now());
        assert_eq!(
            resolve_at(Some(" 14:45 "), &ctx).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 14, 14, 45, 0).unwrap()
        );
    }

    #[test]
    fn notation_words_are_joined() {
        let body = parse_notation(&["Review".into(), "PR".into(), "@work".into(), "+code".into()])
            .unwrap();
        assert_eq!(body.description(), Some("Review PR"));
        assert_eq!(body.project.as_deref(), Some("work"));
        assert_eq!(body.tags, vec!["code".to_string()]);

        let err = parse_notation(&["@end".into()]).unwrap_err();
        assert!(err.to_string().contains("only valid in a log file"));
    }

    #[test]
    fn describe_writes_markers_in_order() {
        let mut s = session(1, 9, None);
        s.project = Some("work".into());
        s.tags = vec!["a".into(), "b".into()];
        s.estimate_minutes = Some(90);
        s.explicit_duration_minutes = Some(20);
        s.remark = Some("note".into());
        assert_eq!(describe(&s), "task 1 @work +a +b ~1h30m (20m) # note");
    }

    #[test]
    fn session_tree_nests_interruptions() {
        let tree = session_tree(vec![
            session(3, 11, None),
            session(2, 10, Some(1)),
            session(1, 9, None),
            session(4, 12, Some(2)),
            session(5, 13, Some(99)),
        ]);
        let shape: Vec<(usize, i64)> = tree.iter().map(|(d, s)| (*d, s.id.get())).collect();
        assert_eq!(shape, vec![(0, 1), (1, 2), (2, 4), (0, 3), (0, 5)]);
    }
}
