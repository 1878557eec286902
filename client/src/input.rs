//! Operator input: held direction keys and latency changes read as text
//! commands, standing in for keyboard capture

use shared::{InputFrame, LatencySettings};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Replace the held keys; sent once per client tick until changed
    Hold(InputFrame),
    Latency(LatencySettings),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}' (try: hold <udlr>, release, latency <delay> <jitter>, status, quit)")]
    Unknown(String),
    #[error("unknown key '{0}' (use u, d, l, r)")]
    UnknownKey(char),
    #[error("{0}")]
    InvalidLatency(String),
}

/// Builds a frame from key letters, e.g. `"ur"` for up and right.
pub fn parse_keys(keys: &str) -> Result<InputFrame, CommandError> {
    let mut frame = InputFrame::default();
    for key in keys.chars().filter(|c| !c.is_whitespace()) {
        match key.to_ascii_lowercase() {
            'u' => frame.up = true,
            'd' => frame.down = true,
            'l' => frame.left = true,
            'r' => frame.right = true,
            other => return Err(CommandError::UnknownKey(other)),
        }
    }
    Ok(frame)
}

/// Parses one line; blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

    match command {
        "" => Ok(None),
        "hold" | "h" => parse_keys(rest).map(|frame| Some(Command::Hold(frame))),
        "release" => Ok(Some(Command::Hold(InputFrame::default()))),
        "latency" | "lat" => rest
            .parse::<LatencySettings>()
            .map(|settings| Some(Command::Latency(settings)))
            .map_err(CommandError::InvalidLatency),
        "status" => Ok(Some(Command::Status)),
        "quit" | "exit" => Ok(Some(Command::Quit)),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys() {
        assert_eq!(parse_keys("r"), Ok(InputFrame::new(false, false, false, true)));
        assert_eq!(parse_keys("UL"), Ok(InputFrame::new(true, false, true, false)));
        assert_eq!(parse_keys("udlr"), Ok(InputFrame::new(true, true, true, true)));
        assert_eq!(parse_keys(""), Ok(InputFrame::default()));
        assert_eq!(parse_keys("x"), Err(CommandError::UnknownKey('x')));
    }

    #[test]
    fn test_parse_hold_and_release() {
        assert_eq!(
            parse("hold u r"),
            Ok(Some(Command::Hold(InputFrame::new(true, false, false, true))))
        );
        assert_eq!(
            parse("release"),
            Ok(Some(Command::Hold(InputFrame::default())))
        );
    }

    #[test]
    fn test_parse_latency() {
        assert_eq!(
            parse("latency 200 25"),
            Ok(Some(Command::Latency(LatencySettings::new(200, 25))))
        );
        assert!(matches!(
            parse("latency soon"),
            Err(CommandError::InvalidLatency(_))
        ));
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("status"), Ok(Some(Command::Status)));
        assert_eq!(parse("exit"), Ok(Some(Command::Quit)));
        assert_eq!(parse("fly"), Err(CommandError::Unknown("fly".to_string())));
    }
}
