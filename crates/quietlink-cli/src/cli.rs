//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a dispatcher driven by commands on stdin
    Run {
        /// Queue log file (in-memory queue when omitted)
        #[arg(short, long)]
        queue: Option<PathBuf>,
        /// Initial quiet interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Inspect or drain a queue log file
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// List pending records without removing them
    Inspect {
        /// Queue log file
        path: PathBuf,
    },
    /// Remove and print every pending record
    Drain {
        /// Queue log file
        path: PathBuf,
    },
}
