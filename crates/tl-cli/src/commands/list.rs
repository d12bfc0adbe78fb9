//! List command for the sessions of one day.

use std::fmt::Display;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};
use tl_core::{SessionStore, TrackContext};
use tl_db::Database;

use super::util::{day_bounds, describe, format_clock, format_elapsed, session_tree};

pub fn run<W, Tz>(
    writer: &mut W,
    db: &Database,
    date: Option<NaiveDate>,
    json: bool,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let day = day_bounds(date, ctx)?;
    let sessions = db.list_between(day.start, day.end)?;

    if json {
        let encoded =
            serde_json::to_string_pretty(&sessions).context("failed to encode sessions")?;
        writeln!(writer, "{encoded}")?;
        return Ok(());
    }

    if sessions.is_empty() {
        writeln!(writer, "No sessions.")?;
        return Ok(());
    }

    for (depth, session) in session_tree(sessions) {
        let end = session
            .end_time
            .map_or_else(|| "now".to_string(), |end| format_clock(ctx.tz, end));
        let continues = session
            .continues_session_id
            .map_or_else(String::new, |root| format!(" (continues #{root})"));
        writeln!(
            writer,
            "{indent}#{id} {start}-{end} {elapsed} [{state}] {body}{continues}",
            indent = "  ".repeat(depth),
            id = session.id,
            start = format_clock(ctx.tz, session.start_time),
            elapsed = format_elapsed(session.elapsed(ctx.now)),
            state = session.state,
            body = describe(&session),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use insta::assert_snapshot;
    use tl_core::{OverlapPolicy, ParseOptions, parse_file, resolve_and_import};

    fn ctx() -> TrackContext<'static, Utc> {
        TrackContext {
            now: DateTime::parse_from_rfc3339("2025-03-14T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            tz: &Utc,
            policy: OverlapPolicy::default(),
        }
    }

    fn seeded(text: &str) -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let options = ParseOptions {
            default_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        };
        resolve_and_import(parse_file(text, &options), &mut db, &Utc, OverlapPolicy::default())
            .unwrap();
        db
    }

    #[test]
    fn lists_sessions_as_a_tree() {
        let db = seeded(
            "09:00 Essay @uni ~3h ->paused\n    09:20 Phone call\n    09:30 @end\n10:00 Mail +inbox\n10:30 @resume\n",
        );
        let mut output = Vec::new();
        run(&mut output, &db, None, false, &ctx()).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        #1 09:00-10:00 1h [completed] Essay @uni ~3h
          #2 09:20-09:30 10m [completed] Phone call
        #3 10:00-10:30 30m [completed] Mail +inbox
        #4 10:30-now 1h30m [working] Essay (continues #1)
        ");
    }

    #[test]
    fn empty_day() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &db, None, false, &ctx()).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"No sessions.");
    }

    #[test]
    fn json_output_is_machine_readable() {
        let db = seeded("09:00 Essay +draft\n09:45 @end\n");
        let mut output = Vec::new();
        run(&mut output, &db, NaiveDate::from_ymd_opt(2025, 3, 14), true, &ctx()).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        let sessions = value.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["description"], "Essay");
        assert_eq!(sessions[0]["state"], "completed");
        assert_eq!(sessions[0]["tags"][0], "draft");
    }
}
