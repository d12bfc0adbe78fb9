//! Live tracking commands: start, interrupt, stop, pause, resume, abandon and
//! delete.

use std::fmt::Display;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tl_core::{Session, SessionId, TrackContext, TrackWarning};
use tl_db::Database;

use super::util::{describe, format_clock, format_elapsed, parse_notation};

pub fn start<W, Tz>(
    writer: &mut W,
    db: &mut Database,
    notation: &[String],
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let body = parse_notation(notation)?;
    let started = tl_core::start(db, body, at, ctx)?;
    if let Some(completed) = &started.completed {
        writeln!(writer, "Completed paused #{} {}", completed.id, describe(completed))?;
    }
    writeln!(
        writer,
        "Started #{} {} at {}",
        started.session.id,
        describe(&started.session),
        format_clock(ctx.tz, started.session.start_time)
    )?;
    write_warnings(writer, &started.warnings)
}

pub fn interrupt<W, Tz>(
    writer: &mut W,
    db: &mut Database,
    notation: &[String],
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let body = parse_notation(notation)?;
    let started = tl_core::interrupt(db, body, at, ctx)?;
    let parent = started
        .session
        .parent_session_id
        .map_or_else(String::new, |id| format!(" (interrupting #{id})"));
    writeln!(
        writer,
        "Started #{} {} at {}{parent}",
        started.session.id,
        describe(&started.session),
        format_clock(ctx.tz, started.session.start_time)
    )?;
    write_warnings(writer, &started.warnings)
}

pub fn stop<W, Tz>(
    writer: &mut W,
    db: &mut Database,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    for session in tl_core::stop(db, at, ctx)? {
        write_closed(writer, "Stopped", &session, ctx)?;
    }
    Ok(())
}

pub fn pause<W, Tz>(
    writer: &mut W,
    db: &mut Database,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let session = tl_core::pause(db, at, ctx)?;
    write_closed(writer, "Paused", &session, ctx)
}

pub fn resume<W, Tz>(
    writer: &mut W,
    db: &mut Database,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let resumed = tl_core::resume(db, at, ctx)?;
    write_closed(writer, "Stopped", &resumed.interruption, ctx)?;
    writeln!(
        writer,
        "Back to #{} {}",
        resumed.parent.id,
        describe(&resumed.parent)
    )?;
    Ok(())
}

pub fn abandon<W, Tz>(
    writer: &mut W,
    db: &mut Database,
    at: DateTime<Utc>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let abandoned = tl_core::abandon(db, at, ctx)?;
    write_closed(writer, "Abandoned", &abandoned.session, ctx)?;
    if let Some(parent) = &abandoned.parent {
        writeln!(writer, "Back to #{} {}", parent.id, describe(parent))?;
    }
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, db: &mut Database, id: SessionId) -> Result<()> {
    let session = tl_core::delete(db, id)?;
    writeln!(writer, "Deleted #{} {}", session.id, describe(&session))?;
    Ok(())
}

fn write_closed<W, Tz>(
    writer: &mut W,
    verb: &str,
    session: &Session,
    ctx: &TrackContext<'_, Tz>,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let end = session.end_time.unwrap_or(ctx.now);
    writeln!(
        writer,
        "{verb} #{} {} at {} ({})",
        session.id,
        describe(session),
        format_clock(ctx.tz, end),
        format_elapsed(session.elapsed(ctx.now))
    )?;
    Ok(())
}

fn write_warnings<W: Write>(writer: &mut W, warnings: &[TrackWarning]) -> Result<()> {
    for warning in warnings {
        writeln!(writer, "warning: {warning}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};
    use insta::assert_snapshot;
    use tl_core::{OverlapPolicy, SessionStore, TrackError};

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, m, 0).unwrap()
    }

    fn ctx() -> TrackContext<'static, Utc> {
        TrackContext {
            now: t(17, 0),
            tz: &Utc,
            policy: OverlapPolicy::default(),
        }
    }

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn interruption_round_trip_output() {
        let mut db = Database::open_in_memory().unwrap();
        let ctx = ctx();
        let mut output = Vec::new();

        start(&mut output, &mut db, &words("Write report @work ~2h"), t(9, 0), &ctx).unwrap();
        interrupt(&mut output, &mut db, &words("Phone call +phone"), t(9, 30), &ctx).unwrap();
        resume(&mut output, &mut db, t(9, 45), &ctx).unwrap();
        stop(&mut output, &mut db, t(10, 30), &ctx).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Started #1 Write report @work ~2h at 09:00
        Started #2 Phone call +phone at 09:30 (interrupting #1)
        Stopped #2 Phone call +phone at 09:45 (15m)
        Back to #1 Write report @work ~2h
        Stopped #1 Write report @work ~2h at 10:30 (1h30m)
        ");
    }

    #[test]
    fn resume_after_pause_reports_adjustment() {
        let mut db = Database::open_in_memory().unwrap();
        let ctx = ctx();
        let mut output = Vec::new();

        start(&mut output, &mut db, &words("Essay"), t(9, 0), &ctx).unwrap();
        pause(&mut output, &mut db, t(10, 0), &ctx).unwrap();
        let at = t(10, 0) - Duration::seconds(30);
        start(&mut output, &mut db, &words("@resume"), at, &ctx).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Started #1 Essay at 09:00
        Paused #1 Essay at 10:00 (1h)
        Completed paused #1 Essay
        Started #2 Essay at 10:00:01
        warning: start moved from 09:59:30 to 10:00:01 to follow session 1
        ");
    }

    #[test]
    fn abandon_and_delete() {
        let mut db = Database::open_in_memory().unwrap();
        let ctx = ctx();
        let mut output = Vec::new();

        start(&mut output, &mut db, &words("Deep work"), t(13, 0), &ctx).unwrap();
        interrupt(&mut output, &mut db, &words("Chat"), t(13, 20), &ctx).unwrap();
        abandon(&mut output, &mut db, t(13, 25), &ctx).unwrap();
        delete(&mut output, &mut db, SessionId::new(1).unwrap()).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Started #1 Deep work at 13:00
        Started #2 Chat at 13:20 (interrupting #1)
        Abandoned #2 Chat at 13:25 (5m)
        Back to #1 Deep work
        Deleted #1 Deep work
        ");
        assert!(db.get_active().unwrap().is_none());
    }

    #[test]
    fn errors_surface_from_the_state_machine() {
        let mut db = Database::open_in_memory().unwrap();
        let ctx = ctx();
        let mut output = Vec::new();

        let err = stop(&mut output, &mut db, t(9, 0), &ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackError>(),
            Some(TrackError::NoActiveSession)
        ));

        let err = start(&mut output, &mut db, &words("Later"), t(18, 0), &ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackError>(),
            Some(TrackError::TimeInFuture { .. })
        ));
        assert!(output.is_empty());
    }
}
