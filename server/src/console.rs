//! Operator commands read from stdin

use shared::LatencySettings;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `latency <delay> <jitter>`
    Latency(LatencySettings),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (try: latency <delay> <jitter>, status, quit)")]
    Unknown(String),
    #[error("{0}")]
    InvalidLatency(String),
}

/// Parses one line; blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

    match command {
        "" => Ok(None),
        "latency" | "lat" => rest
            .parse::<LatencySettings>()
            .map(|settings| Some(ConsoleCommand::Latency(settings)))
            .map_err(ConsoleError::InvalidLatency),
        "status" => Ok(Some(ConsoleCommand::Status)),
        "quit" | "exit" => Ok(Some(ConsoleCommand::Quit)),
        other => Err(ConsoleError::Unknown(other.to_string())),
    }
}
