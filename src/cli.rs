//! Command-line interface definition for bluewatch.
//!
//! This module defines the CLI structure using clap derive macros,
//! including all subcommands and their arguments.

use crate::monitor::Pattern;
use crate::output::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// bluewatch - Unit and node event monitor for a BlueChi controller
///
/// Subscribes to unit lifecycle events and node status changes on the
/// controller and prints them as they arrive.
#[derive(Debug, Parser)]
#[command(name = "bluewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "BLUEWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all logging except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for events and node lists
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Prefix text output with the local time an event was received
    #[arg(long, global = true)]
    pub timestamps: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level forced by the verbose/quiet flags, if any.
    pub fn log_level(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("error");
        }

        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Subscribe to unit events and print them until interrupted
    MonitorUnits(MonitorUnitsArgs),

    /// Print node status changes until interrupted
    MonitorNodes,

    /// Print system status changes until interrupted
    MonitorSystem,

    /// List nodes known to the controller
    ListNodes,

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Arguments for the `monitor-units` subcommand.
#[derive(Debug, Args)]
pub struct MonitorUnitsArgs {
    /// Node name, or `*` for every node (default: monitor.node from config)
    #[arg(short, long)]
    pub node: Option<Pattern>,

    /// Unit name, or `*` for every unit (default: monitor.unit from config)
    #[arg(short, long)]
    pub unit: Option<Pattern>,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file
    Validate,

    /// Show the current configuration
    Show,
}
