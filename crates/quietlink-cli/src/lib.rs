//! Quietlink CLI library
//!
//! Components behind the `quietlink` binary: argument parsing, layered
//! configuration, the interactive dispatcher driver and the queue inspector.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::{HexLineTransport, QuietlinkApp};
pub use cli::{Cli, Commands, QueueAction};
pub use commands::{CommandDispatcher, InputCommand};
pub use config::AppConfig;
pub use error::{CliError, Result};
