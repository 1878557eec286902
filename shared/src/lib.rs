//! Protocol contract shared by the server and the client.
//!
//! Everything both peers must agree on out of band lives here: well-known
//! ports, handshake tokens, the fixed-layout payloads carried on each
//! channel, the latency model and the settings channel primitives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod latency;
pub mod settings;
pub mod wire;

pub use latency::{LatencySimulator, SharedLatency};
pub use wire::{FixedLayout, WireError};

pub const SERVER_HOST: &str = "127.0.0.1";
pub const CONTROL_PORT: u16 = 8080;
pub const SETTINGS_PORT: u16 = 8081;

pub const CONNECT_TOKEN: &[u8] = b"GameNetBasics: CONNECT";
pub const ACK_TOKEN: &[u8] = b"GameNetBasics: ACK";

pub const PLAYER_WIDTH: i32 = 50;
pub const PLAYER_HEIGHT: i32 = 50;
/// Pixels moved per simulation tick for each held direction.
pub const PLAYER_SPEED: i32 = 4;

pub const SERVER_TICK_RATE: u32 = 20;
pub const CLIENT_TICK_RATE: u32 = 60;

pub const SPAWN_X: i32 = 375;
pub const SPAWN_Y: i32 = 200;

pub const MAX_ROUNDTRIP_DELAY_MS: i32 = 1000;
pub const MAX_JITTER_MS: i32 = 500;

/// Authoritative position of one tracked entity.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn spawn() -> Self {
        Self::new(SPAWN_X, SPAWN_Y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Directional keys held during one client tick.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputFrame {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputFrame {
    pub fn new(up: bool, down: bool, left: bool, right: bool) -> Self {
        Self {
            up,
            down,
            left,
            right,
        }
    }

    pub fn is_idle(&self) -> bool {
        !(self.up || self.down || self.left || self.right)
    }
}

/// Artificial latency applied to outbound application messages.
///
/// Each peer keeps its own copy; the settings channel keeps them loosely in
/// sync with last-write-wins on either side.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencySettings {
    pub roundtrip_delay_ms: i32,
    pub jitter_ms: i32,
}

impl LatencySettings {
    pub fn new(roundtrip_delay_ms: i32, jitter_ms: i32) -> Self {
        Self {
            roundtrip_delay_ms,
            jitter_ms,
        }
    }

    /// Clamps both fields into `[0, max]` of the given bounds.
    pub fn clamped(self, bounds: LatencyBounds) -> Self {
        Self {
            roundtrip_delay_ms: self
                .roundtrip_delay_ms
                .clamp(0, bounds.max_roundtrip_delay_ms.max(0)),
            jitter_ms: self.jitter_ms.clamp(0, bounds.max_jitter_ms.max(0)),
        }
    }
}

impl fmt::Display for LatencySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rtt {}ms, jitter ±{}ms",
            self.roundtrip_delay_ms, self.jitter_ms
        )
    }
}

impl FromStr for LatencySettings {
    type Err = String;

    /// Parses `"<delay> <jitter>"` in milliseconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(delay), Some(jitter), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected '<delay> <jitter>', got '{}'", s.trim()));
        };

        let delay = delay
            .parse::<i32>()
            .map_err(|e| format!("invalid delay '{}': {}", delay, e))?;
        let jitter = jitter
            .parse::<i32>()
            .map_err(|e| format!("invalid jitter '{}': {}", jitter, e))?;

        Ok(Self::new(delay, jitter))
    }
}

/// Upper limits applied to every locally set or peer-received setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyBounds {
    pub max_roundtrip_delay_ms: i32,
    pub max_jitter_ms: i32,
}

impl Default for LatencyBounds {
    fn default() -> Self {
        Self {
            max_roundtrip_delay_ms: MAX_ROUNDTRIP_DELAY_MS,
            max_jitter_ms: MAX_JITTER_MS,
        }
    }
}

/// First message on the settings channel: latency plus spawn position.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct InitialSettings {
    pub latency: LatencySettings,
    pub spawn: Position,
}

/// Port of the dedicated per-client UDP socket, sent in the
/// [`HandshakeVariant::DedicatedPort`] variant.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PortAssignment {
    pub port: i32,
}

impl PortAssignment {
    pub fn new(port: u16) -> Self {
        Self { port: port as i32 }
    }
}

/// How the client finds the UDP endpoint it sends `CONNECT` to.
///
/// Both peers must be configured with the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeVariant {
    /// `CONNECT` goes to the well-known control port; `ACK` comes back from
    /// a freshly opened per-client socket.
    #[default]
    SharedControl,
    /// The server opens the per-client socket first and announces its port
    /// on the settings channel; `CONNECT` goes straight to it.
    DedicatedPort,
}

impl FromStr for HandshakeVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" | "shared-control" => Ok(Self::SharedControl),
            "dedicated" | "dedicated-port" => Ok(Self::DedicatedPort),
            other => Err(format!(
                "unknown handshake variant '{}' (expected 'shared' or 'dedicated')",
                other
            )),
        }
    }
}
