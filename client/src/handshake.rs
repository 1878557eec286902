//! Client side of connection establishment.
//!
//! `Idle → SettingsNegotiated → ControlSent → Acknowledged → Bound`. The
//! data socket only reaches `Bound` when the first datagram after `CONNECT`
//! is exactly the ACK token; any other payload aborts the handshake and the
//! socket is never connected.

use log::debug;
use shared::{WireError, ACK_TOKEN, CONNECT_TOKEN};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    SettingsNegotiated,
    ControlSent,
    Acknowledged,
    Bound,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Idle => "idle",
            HandshakeState::SettingsNegotiated => "settings negotiated",
            HandshakeState::ControlSent => "control sent",
            HandshakeState::Acknowledged => "acknowledged",
            HandshakeState::Bound => "bound",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("expected ACK from {peer}, got {:?}", String::from_utf8_lossy(.payload))]
    UnexpectedToken { peer: SocketAddr, payload: Vec<u8> },
    #[error("settings channel closed before negotiation finished")]
    SettingsClosed,
    #[error("could not resolve server address '{0}'")]
    Unresolved(String),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Tracks and logs handshake progress.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn advance(&mut self, next: HandshakeState) {
        debug!("Handshake: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Sends `CONNECT` to `target` and waits for exactly one datagram.
    ///
    /// On the ACK token the socket is connected to the datagram's sender,
    /// which pins the data channel to the server's per-client socket.
    /// Returns that peer address.
    pub async fn rendezvous(
        &mut self,
        socket: &UdpSocket,
        target: SocketAddr,
    ) -> Result<SocketAddr, HandshakeError> {
        socket.send_to(CONNECT_TOKEN, target).await?;
        self.advance(HandshakeState::ControlSent);

        let mut buf = [0u8; 256];
        let (len, peer) = socket.recv_from(&mut buf).await?;
        if &buf[..len] != ACK_TOKEN {
            return Err(HandshakeError::UnexpectedToken {
                peer,
                payload: buf[..len].to_vec(),
            });
        }
        self.advance(HandshakeState::Acknowledged);

        socket.connect(peer).await?;
        self.advance(HandshakeState::Bound);
        Ok(peer)
    }
}
