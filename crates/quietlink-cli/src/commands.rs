//! Command handlers for the quietlink CLI

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use quietlink_core::{DurableQueue, FileQueue, Payload, PriorityClass, QueueConfig};

use crate::app::{HexLineTransport, QuietlinkApp};
use crate::cli::{Cli, Commands, QueueAction};
use crate::config::AppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Interactive Input
// ----------------------------------------------------------------------------

/// One line of interactive input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Online,
    Offline,
    /// New quiet interval; `None` clears throttling
    Interval(Option<u64>),
    Trusted,
    Send {
        priority: PriorityClass,
        payload: Payload,
    },
    Capability {
        low_power: bool,
    },
    Flush,
    Stats,
    State,
    Help,
    Quit,
}

impl InputCommand {
    /// Parse a line; `Ok(None)` for blank input
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "online" => InputCommand::Online,
            "offline" => InputCommand::Offline,
            "interval" => InputCommand::Interval(parse_interval(rest)?),
            "trusted" => InputCommand::Trusted,
            "send" => {
                let (priority, text) = rest.split_once(char::is_whitespace).ok_or_else(|| {
                    CliError::InvalidInput("usage: send <queueable|discardable|urgent> <text>".into())
                })?;
                InputCommand::Send {
                    priority: priority.parse().map_err(CliError::InvalidInput)?,
                    payload: parse_payload(text.trim())?,
                }
            }
            "capability" => InputCommand::Capability {
                low_power: rest.eq_ignore_ascii_case("low-power"),
            },
            "flush" => InputCommand::Flush,
            "stats" => InputCommand::Stats,
            "state" => InputCommand::State,
            "help" | "?" => InputCommand::Help,
            "quit" | "exit" => InputCommand::Quit,
            other => {
                return Err(CliError::InvalidInput(format!(
                    "unknown command '{}', try 'help'",
                    other
                )))
            }
        };
        Ok(Some(command))
    }

    pub fn help() -> &'static str {
        "commands:\n  \
         online | offline\n  \
         interval <ms|none>\n  \
         trusted\n  \
         send <queueable|discardable|urgent> <text|0xHEX>\n  \
         capability [low-power]\n  \
         flush | stats | state | help | quit"
    }
}

fn parse_interval(text: &str) -> Result<Option<u64>> {
    if text.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let millis: i64 = text
        .parse()
        .map_err(|_| CliError::InvalidInput(format!("invalid interval '{}'", text)))?;
    let interval = quietlink_core::QuietInterval::try_from_signed_millis(millis)?;
    Ok(interval.as_millis())
}

/// `0x`-prefixed text is decoded as hex; anything else is sent as UTF-8
fn parse_payload(text: &str) -> Result<Payload> {
    if text.is_empty() {
        return Err(CliError::InvalidInput("empty payload".into()));
    }
    match text.strip_prefix("0x") {
        Some(encoded) => Ok(Payload::new(hex::decode(encoded)?)),
        None => Ok(Payload::from(text)),
    }
}

// ----------------------------------------------------------------------------
// Command Dispatcher
// ----------------------------------------------------------------------------

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Run { queue, interval } => {
                let mut config = config;
                config.apply_overrides(queue, interval);
                config.validate()?;
                Self::handle_run_command(config).await
            }
            Commands::Queue { action } => match action {
                QueueAction::Inspect { path } => Self::handle_inspect_command(&path),
                QueueAction::Drain { path } => Self::handle_drain_command(&path),
            },
        }
    }

    /// Run the dispatcher, reading commands from stdin until `quit` or EOF
    async fn handle_run_command(config: AppConfig) -> Result<()> {
        let prompt = config.cli.prompt.clone();
        let show_events = config.cli.show_events;
        let mut app = QuietlinkApp::start(config, Arc::new(HexLineTransport::stdout())).await?;

        let event_logger = match app.take_event_receiver() {
            Some(mut events) if show_events => Some(tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    info!("Event: {:?}", event);
                }
            })),
            _ => None,
        };

        eprintln!("{}", InputCommand::help());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            eprint!("{}", prompt);
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            match InputCommand::parse(&line) {
                Ok(None) => continue,
                Ok(Some(InputCommand::Quit)) => break,
                Ok(Some(command)) => match app.execute(command).await {
                    Ok(message) => eprintln!("{}", message),
                    Err(e) => warn!("{}", e),
                },
                Err(e) => eprintln!("{}", e),
            }
        }

        app.stop().await?;
        if let Some(logger) = event_logger {
            let _ = logger.await;
        }
        Ok(())
    }

    /// List pending records without removing them
    fn handle_inspect_command(path: &Path) -> Result<()> {
        let queue = Self::open_existing(path)?;
        let records = queue.peek_all()?;
        println!("{}: {} pending record(s)", path.display(), records.len());
        for (index, payload) in records.iter().enumerate() {
            println!("{}", format_record(index, payload));
        }
        queue.close()?;
        Ok(())
    }

    /// Remove and print every pending record
    fn handle_drain_command(path: &Path) -> Result<()> {
        let queue = Self::open_existing(path)?;
        let records = queue.drain_all()?;
        for (index, payload) in records.iter().enumerate() {
            println!("{}", format_record(index, payload));
        }
        println!("drained {} record(s) from {}", records.len(), path.display());
        queue.close()?;
        Ok(())
    }

    fn open_existing(path: &Path) -> Result<FileQueue> {
        if !path.exists() {
            return Err(CliError::InvalidInput(format!(
                "queue file {} does not exist",
                path.display()
            )));
        }
        Ok(FileQueue::open(path, &QueueConfig::at_path(path))?)
    }
}

/// One record per line: index, size, hex bytes
pub fn format_record(index: usize, payload: &Payload) -> String {
    format!(
        "{:>4}  {:>6}B  {}",
        index,
        payload.len(),
        hex::encode(payload.as_bytes())
    )
}
