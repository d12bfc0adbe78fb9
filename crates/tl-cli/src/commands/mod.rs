//! CLI subcommand implementations.

pub mod export;
pub mod import;
pub mod list;
pub mod status;
pub mod track;
pub mod util;
