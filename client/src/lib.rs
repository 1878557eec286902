//! # Latency Lab Client
//!
//! Client side of the latency study. It pushes its operator's directional
//! input to the authoritative server and mirrors the position the server
//! sends back. Rendering and keyboard capture are left to the host: the
//! library consumes `InputFrame`s and produces a stream of positions.
//!
//! ## Connection Setup
//!
//! [`network::Client::connect`] walks the handshake states in order:
//!
//! 1. **Settings negotiated**: the TCP settings channel delivers the initial
//!    latency settings and the spawn position (and, in the dedicated-port
//!    variant, the port of the server's per-client UDP socket)
//! 2. **Control sent**: a `CONNECT` token goes to the server's UDP control
//!    endpoint
//! 3. **Acknowledged**: exactly one datagram is awaited; it must be the `ACK`
//!    token or connection setup fails
//! 4. **Bound**: the UDP socket is connected to the ACK's sender and becomes
//!    the permanent data channel
//!
//! ## After Setup
//!
//! - Input frames are sent behind the local artificial delay, each on its
//!   own task, so the caller's tick is never blocked
//! - A receive loop decodes state updates into a `watch` channel that acts as
//!   the read-only position mirror
//! - A settings reader applies latency updates pushed by the server, and
//!   local changes are pushed back fire-and-forget
//!
//! ## Module Organization
//!
//! - `handshake`: handshake states and the UDP rendezvous
//! - `input`: operator commands (held keys, latency changes)
//! - `network`: the connected client and its background loops
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//! use shared::InputFrame;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect(&ClientConfig::default()).await?;
//!     let mut positions = client.subscribe();
//!
//!     client.send_input(InputFrame::new(false, false, false, true)).await;
//!     positions.changed().await?;
//!     println!("now at {}", *positions.borrow());
//!     Ok(())
//! }
//! ```

pub mod handshake;
pub mod input;
pub mod network;
