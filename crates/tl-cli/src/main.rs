use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use tl_core::TrackContext;
use tracing_subscriber::EnvFilter;

use tl_cli::commands::{export, import, list, status, track, util};
use tl_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(tl_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = tl_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (mut db, config) = open_database(cli.config.as_deref())?;
    let ctx = TrackContext {
        now: Utc::now(),
        tz: &Local,
        policy: config.policy(),
    };
    let at = |at: Option<&str>| util::resolve_at(at, &ctx);
    let mut stdout = io::stdout().lock();

    match command {
        Commands::Start(args) => {
            let at = at(args.at.at.as_deref())?;
            track::start(&mut stdout, &mut db, &args.notation, at, &ctx)?;
        }
        Commands::Interrupt(args) => {
            let at = at(args.at.at.as_deref())?;
            track::interrupt(&mut stdout, &mut db, &args.notation, at, &ctx)?;
        }
        Commands::Stop(args) => track::stop(&mut stdout, &mut db, at(args.at.as_deref())?, &ctx)?,
        Commands::Pause(args) => {
            track::pause(&mut stdout, &mut db, at(args.at.as_deref())?, &ctx)?;
        }
        Commands::Resume(args) => {
            track::resume(&mut stdout, &mut db, at(args.at.as_deref())?, &ctx)?;
        }
        Commands::Abandon(args) => {
            track::abandon(&mut stdout, &mut db, at(args.at.as_deref())?, &ctx)?;
        }
        Commands::Delete { id } => track::delete(&mut stdout, &mut db, id)?,
        Commands::Import { file, date } => {
            import::run(&mut stdout, &mut db, &file, date, &ctx)?;
        }
        Commands::List { date, json } => list::run(&mut stdout, &db, date, json, &ctx)?,
        Commands::Export { date } => export::run(&mut stdout, &db, date, &ctx)?,
        Commands::Status => status::run(&mut stdout, &db, &config.database_path, &ctx)?,
    }

    stdout.flush()?;
    Ok(())
}
