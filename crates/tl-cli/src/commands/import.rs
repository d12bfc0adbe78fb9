//! Import command for storing a log file in one transaction.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};
use tl_core::{ParseOptions, TrackContext, parse_file, resolve_and_import};
use tl_db::Database;

pub fn run<W: Write, Tz: TimeZone>(
    writer: &mut W,
    db: &mut Database,
    path: &Path,
    date: Option<NaiveDate>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_text(writer, db, &text, date, ctx)
}

fn import_text<W: Write, Tz: TimeZone>(
    writer: &mut W,
    db: &mut Database,
    text: &str,
    date: Option<NaiveDate>,
    ctx: &TrackContext<'_, Tz>,
) -> Result<usize> {
    let default_date = date.unwrap_or_else(|| ctx.now.with_timezone(ctx.tz).date_naive());
    let parsed = parse_file(text, &ParseOptions { default_date });

    for warning in &parsed.warnings {
        writeln!(writer, "warning: {warning}")?;
    }
    if !parsed.is_importable() {
        for error in &parsed.errors {
            writeln!(writer, "error: {error}")?;
        }
        anyhow::bail!(
            "import rejected: {} line(s) failed, nothing was stored",
            parsed.errors.len()
        );
    }

    let report = resolve_and_import(parsed, db, ctx.tz, ctx.policy)?;
    for warning in &report.warnings {
        writeln!(writer, "warning: {warning}")?;
    }
    let imported = report.imported.len();
    writeln!(writer, "Imported {imported} session(s)")?;
    tracing::debug!(imported, "log file imported");
    Ok(imported)
}
