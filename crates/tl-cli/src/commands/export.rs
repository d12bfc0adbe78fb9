//! Export command: writes the sessions of a day back as log notation.
//!
//! Interruptions are indented under their parent. An end time that the next
//! line does not already imply is written as an `@end`, `@pause` or
//! `@abandon` line; otherwise a non-default state becomes a `->state` suffix.
//! Continuations are written with their stored description.

use std::fmt::Display;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tl_core::{ControlMarker, Session, SessionState, SessionStore, TrackContext};
use tl_db::Database;

use super::util::{day_bounds, describe, format_clock, session_tree};

const INDENT: &str = "    ";

pub fn run<W, Tz>(
    writer: &mut W,
    db: &Database,
    date: Option<NaiveDate>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let day = day_bounds(date, ctx)?;
    let sessions = db.list_between(day.start, day.end)?;
    write!(writer, "{}", render_log(sessions, ctx.tz))?;
    Ok(())
}

/// Renders sessions as a log buffer that parses back to the same sessions.
pub fn render_log<Tz>(sessions: Vec<Session>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let rows = session_tree(sessions);
    let mut log = LogWriter::new(tz);
    // Control lines waiting for their subtree to finish: (depth, at, marker).
    let mut pending: Vec<(usize, DateTime<Utc>, ControlMarker)> = Vec::new();

    for (pos, (depth, session)) in rows.iter().enumerate() {
        while let Some(&(control_depth, at, marker)) = pending.last() {
            if control_depth < *depth {
                break;
            }
            pending.pop();
            log.line(control_depth, at, &format!("@{}", marker.as_str()));
        }

        let next_sibling_start = rows[pos + 1..]
            .iter()
            .find(|(next_depth, _)| next_depth <= depth)
            .filter(|(next_depth, _)| next_depth == depth)
            .map(|(_, next)| next.start_time);

        let closing = match session.end_time {
            Some(end)
                if session.explicit_duration_minutes.is_none()
                    && next_sibling_start != Some(end) =>
            {
                Some((end, control_for(session.state)))
            }
            _ => None,
        };

        let mut body = describe(session);
        if closing.is_none() && session.end_time.is_some() {
            if let Some(suffix) = suffix_for(session.state) {
                body.push_str(&format!(" ->{suffix}"));
            }
        }
        log.line(*depth, session.start_time, &body);

        if let Some((end, marker)) = closing {
            pending.push((*depth, end, marker));
        }
    }

    while let Some((depth, at, marker)) = pending.pop() {
        log.line(depth, at, &format!("@{}", marker.as_str()));
    }
    log.finish()
}

const fn control_for(state: SessionState) -> ControlMarker {
    match state {
        SessionState::Paused => ControlMarker::Pause,
        SessionState::Abandoned => ControlMarker::Abandon,
        SessionState::Working | SessionState::Completed => ControlMarker::End,
    }
}

const fn suffix_for(state: SessionState) -> Option<&'static str> {
    match state {
        SessionState::Paused => Some("paused"),
        SessionState::Abandoned => Some("abandoned"),
        SessionState::Working | SessionState::Completed => None,
    }
}

/// Accumulates log lines, writing a date whenever the local day changes.
struct LogWriter<'a, Tz: TimeZone> {
    tz: &'a Tz,
    out: String,
    last_date: Option<NaiveDate>,
}

impl<'a, Tz> LogWriter<'a, Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    const fn new(tz: &'a Tz) -> Self {
        Self {
            tz,
            out: String::new(),
            last_date: None,
        }
    }

    fn line(&mut self, depth: usize, at: DateTime<Utc>, body: &str) {
        let date = at.with_timezone(self.tz).date_naive();
        self.out.push_str(&INDENT.repeat(depth));
        if self.last_date != Some(date) {
            self.out.push_str(&format!("{date} "));
            self.last_date = Some(date);
        }
        self.out.push_str(&format_clock(self.tz, at));
        self.out.push(' ');
        self.out.push_str(body);
        self.out.push('\n');
    }

    fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use tl_core::{OverlapPolicy, ParseOptions, parse_file, resolve_and_import};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn import(db: &mut Database, text: &str) {
        let options = ParseOptions {
            default_date: date(),
        };
        resolve_and_import(parse_file(text, &options), db, &Utc, OverlapPolicy::default())
            .unwrap();
    }

    fn export(db: &Database) -> String {
        let ctx = TrackContext {
            now: date().and_hms_opt(23, 0, 0).unwrap().and_utc(),
            tz: &Utc,
            policy: OverlapPolicy::default(),
        };
        let mut output = Vec::new();
        run(&mut output, db, Some(date()), &ctx).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn renders_nesting_and_control_lines() {
        let mut db = Database::open_in_memory().unwrap();
        import(
            &mut db,
            "09:00 Essay @uni ~3h\n    09:20 Phone call +phone\n    09:30 @end\n10:00 Mail (15m)\n10:30 Review # with Ana\n11:00 @pause\n11:30 Break ->abandoned\n11:45 Focus\n",
        );

        assert_snapshot!(export(&db), @r"
        2025-03-14 09:00 Essay @uni ~3h
            09:20 Phone call +phone
            09:30 @end
        10:00 Mail (15m)
        10:30 Review # with Ana
        11:00 @pause
        11:30 Break ->abandoned
        11:45 Focus
        ");
    }

    #[test]
    fn exported_log_imports_to_the_same_sessions() {
        let text = "09:00 Essay @uni ~3h\n    09:20 Phone call +phone\n        09:25 Doorbell\n        09:26 @abandon\n    09:30 @end\n10:00:30 Mail (15m)\n10:30 Review ->paused\n11:00 Lunch\n12:00 @end\n";
        let mut original = Database::open_in_memory().unwrap();
        import(&mut original, text);
        let exported = export(&original);

        let mut copy = Database::open_in_memory().unwrap();
        import(&mut copy, &exported);

        let strip = |db: &Database| {
            db.list_sessions()
                .unwrap()
                .into_iter()
                .map(|s| (s.start_time, s.end_time, describe(&s), s.state, s.parent_session_id))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&original), strip(&copy));
        assert_eq!(export(&copy), exported);
    }

    #[test]
    fn empty_day_exports_nothing() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(export(&db), "");
    }
}
