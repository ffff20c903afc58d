//! CLI module for relaunch - command-line interface and subcommands.

pub mod commands;
pub mod signals;

pub use commands::Cli;
