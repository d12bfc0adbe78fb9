//! Status command for showing what the clock is running for.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::TimeZone;
use tl_core::{SessionStore, TrackContext, format_minutes, summarize_chain};
use tl_db::Database;

use super::util::{describe, format_clock, format_elapsed};

pub fn run<W, Tz>(
    writer: &mut W,
    db: &Database,
    database_path: &Path,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    writeln!(writer, "Database: {}", database_path.display())?;

    match db.get_active()? {
        Some(active) => {
            writeln!(
                writer,
                "Working on #{} {} since {} ({})",
                active.id,
                describe(&active),
                format_clock(ctx.tz, active.start_time),
                format_elapsed(active.elapsed(ctx.now))
            )?;

            let mut parent_id = active.parent_session_id;
            while let Some(id) = parent_id {
                let Some(parent) = db.get_by_id(id)? else { break };
                writeln!(writer, "  interrupting #{} {}", parent.id, describe(&parent))?;
                parent_id = parent.parent_session_id;
            }

            let chain = db.get_continuation_chain(active.chain_root())?;
            if let Some(summary) = summarize_chain(&chain, ctx.now) {
                if summary.members > 1 || summary.estimate_minutes.is_some() {
                    let elapsed = u32::try_from(summary.elapsed_minutes.max(0)).unwrap_or(u32::MAX);
                    let estimate = summary
                        .estimate_minutes
                        .map_or_else(String::new, |est| format!(" of ~{}", format_minutes(est)));
                    writeln!(
                        writer,
                        "  chain #{}: {} session(s), {}{estimate}",
                        summary.root,
                        summary.members,
                        format_minutes(elapsed)
                    )?;
                }
            }
        }
        None => writeln!(writer, "Nothing active.")?,
    }

    let paused: Vec<_> = db
        .list_paused()?
        .into_iter()
        .filter(|session| session.end_time.is_some())
        .collect();
    if !paused.is_empty() {
        writeln!(writer, "Paused:")?;
        for session in paused {
            writeln!(
                writer,
                "- #{} {} (since {})",
                session.id,
                describe(&session),
                format_clock(ctx.tz, session.end_time.unwrap_or(session.start_time))
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use insta::assert_snapshot;
    use tl_core::{OverlapPolicy, parse_fragment};

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2025-03-14T{h:02}:{m:02}:00Z"))
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn status_command_outputs_active_stack_and_paused_work() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("timelog.db");
        let mut db = Database::open(&db_path).unwrap();
        let ctx = TrackContext {
            now: t(11, 0),
            tz: &Utc,
            policy: OverlapPolicy::default(),
        };

        tl_core::start(&mut db, parse_fragment("Thesis ~4h").unwrap(), t(8, 0), &ctx).unwrap();
        tl_core::pause(&mut db, t(9, 0), &ctx).unwrap();
        tl_core::start(&mut db, parse_fragment("Admin @ops").unwrap(), t(9, 0), &ctx).unwrap();
        tl_core::pause(&mut db, t(9, 30), &ctx).unwrap();
        tl_core::start(&mut db, parse_fragment("@resume Thesis").unwrap(), t(10, 0), &ctx)
            .unwrap();
        tl_core::interrupt(&mut db, parse_fragment("Call").unwrap(), t(10, 45), &ctx).unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &db_path, &ctx).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&db_path.display().to_string(), "[TEMP]/timelog.db");
        assert_snapshot!(output, @r"
        Database: [TEMP]/timelog.db
        Working on #4 Call since 10:45 (15m)
          interrupting #3 Thesis
        Paused:
        - #2 Admin @ops (since 09:30)
        ");
    }

    #[test]
    fn status_shows_chain_progress() {
        let db_path = Path::new("/data/timelog.db");
        let mut db = Database::open_in_memory().unwrap();
        let ctx = TrackContext {
            now: t(11, 0),
            tz: &Utc,
            policy: OverlapPolicy::default(),
        };
        tl_core::start(&mut db, parse_fragment("Thesis ~4h").unwrap(), t(8, 0), &ctx).unwrap();
        tl_core::pause(&mut db, t(9, 0), &ctx).unwrap();
        tl_core::start(&mut db, parse_fragment("@resume").unwrap(), t(10, 0), &ctx).unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, db_path, &ctx).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Database: /data/timelog.db
        Working on #2 Thesis since 10:00 (1h)
          chain #1: 2 session(s), 2h of ~4h
        ");
    }

    #[test]
    fn status_when_idle() {
        let db = Database::open_in_memory().unwrap();
        let ctx = TrackContext {
            now: t(11, 0),
            tz: &Utc,
            policy: OverlapPolicy::default(),
        };
        let mut output = Vec::new();
        run(&mut output, &db, Path::new("/data/timelog.db"), &ctx).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Database: /data/timelog.db
        Nothing active.
        ");
    }
}
