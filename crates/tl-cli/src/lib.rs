//! Timelog CLI library.
//!
//! This crate provides the CLI interface for the time tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{AtArgs, Cli, Commands, NotationArgs};
pub use config::Config;
