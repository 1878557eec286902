//! # Latency Lab Server
//!
//! Authoritative server for the latency study. It tracks one moving box per
//! connected client, applies the client's directional input at a fixed tick
//! rate and pushes the resulting position back, with an artificial, tunable
//! round-trip delay and jitter injected on every outbound state update.
//!
//! ## Connection Establishment
//!
//! Every client owns two conversations with the server:
//!
//! ### Settings Channel (TCP)
//! Opened first. The server writes the initial latency settings and the spawn
//! position, and in the dedicated-port variant also the port of the client's
//! private UDP socket. Afterwards both sides push latency updates over it
//! whenever their operator changes them.
//!
//! ### Data Channel (UDP)
//! The client sends a `CONNECT` token to the control endpoint. The server
//! answers with an `ACK` from a socket opened for that client alone and
//! connected to the client's observed address, so game traffic can never be
//! misdirected to another peer. The session is registered only after the ACK
//! has been sent on the connected socket.
//!
//! ## Runtime Structure
//!
//! - **Settings listener**: accepts settings channels and negotiates them
//! - **Control listener**: receives `CONNECT` tokens (shared-control variant)
//! - **Input loop** (one per client): buffers input frames in arrival order
//! - **Settings reader** (one per client): applies peer latency updates
//! - **Tick loop**: drains each client's buffered frames, moves the box and
//!   enqueues one state update per client per tick
//! - **Delayed sends**: every state update waits out its artificial delay on
//!   its own task, so jittered updates may overtake each other
//!
//! ## Module Organization
//!
//! - `config`: runtime configuration with defaults from the shared protocol
//! - `console`: operator commands read from stdin
//! - `handshake`: server side of the UDP rendezvous
//! - `network`: listeners, per-client loops and the tick loop
//! - `session`: per-client state and the session registry
//! - `simulation`: the movement rule applied each tick
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     let handle = server.handle();
//!
//!     tokio::spawn(server.run());
//!
//!     // Inject 200ms round-trip delay with ±25ms jitter for every client
//!     handle.set_latency(shared::LatencySettings::new(200, 25)).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod handshake;
pub mod network;
pub mod session;
pub mod simulation;
