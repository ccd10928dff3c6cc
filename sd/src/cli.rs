//! Command-line interface for the sd binary

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Session orchestrator daemon
#[derive(Debug, Parser)]
#[command(name = "sd", version, about = "Session orchestrator for iterative LLM agent loops")]
pub struct Cli {
    /// Path to a config file (default: .sessiond.yml, then user config)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon: rehydrate active sessions and serve until ctrl-c
    Daemon,

    /// Show session counts from the store
    Status,

    /// Print version information
    Version,
}
