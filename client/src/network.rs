//! Client network layer: connection setup, input sends and the position mirror

use crate::handshake::{Handshake, HandshakeError, HandshakeState};
use log::{error, info, warn};
use shared::settings::{read_message, run_settings_reader, SettingsWriter};
use shared::{
    FixedLayout, HandshakeVariant, InitialSettings, InputFrame, LatencyBounds, LatencySettings,
    LatencySimulator, PortAssignment, Position, SharedLatency, CLIENT_TICK_RATE, CONTROL_PORT,
    SERVER_HOST, SETTINGS_PORT,
};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_host: String,
    pub control_port: u16,
    pub settings_port: u16,
    pub variant: HandshakeVariant,
    pub latency_bounds: LatencyBounds,
    /// Input frames sent per second
    pub tick_rate: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: SERVER_HOST.to_string(),
            control_port: CONTROL_PORT,
            settings_port: SETTINGS_PORT,
            variant: HandshakeVariant::default(),
            latency_bounds: LatencyBounds::default(),
            tick_rate: CLIENT_TICK_RATE,
        }
    }
}

impl ClientConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

/// A client whose handshake has completed
pub struct Client {
    data: Arc<UdpSocket>,
    server_data_addr: SocketAddr,
    latency: SharedLatency,
    simulator: LatencySimulator,
    bounds: LatencyBounds,
    settings: SettingsWriter<OwnedWriteHalf>,
    position_rx: watch::Receiver<Position>,
    handshake: Handshake,
    settings_task: JoinHandle<()>,
    state_task: JoinHandle<()>,
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, HandshakeError> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| HandshakeError::Unresolved(format!("{}:{}", host, port)))
}

impl Client {
    /// Runs the full connection setup against the configured server.
    ///
    /// Opens the settings channel, reads the initial settings (and the
    /// dedicated port in that variant), performs the UDP rendezvous and only
    /// then starts the settings reader and the state receive loop.
    pub async fn connect(config: &ClientConfig) -> Result<Self, HandshakeError> {
        let mut handshake = Handshake::new();

        let settings_addr = resolve(&config.server_host, config.settings_port).await?;
        let mut stream = TcpStream::connect(settings_addr).await?;
        info!("Settings channel connected to {}", settings_addr);

        let initial = read_message::<InitialSettings, _>(&mut stream)
            .await?
            .ok_or(HandshakeError::SettingsClosed)?;

        let control_port = match config.variant {
            HandshakeVariant::SharedControl => config.control_port,
            HandshakeVariant::DedicatedPort => read_message::<PortAssignment, _>(&mut stream)
                .await?
                .ok_or(HandshakeError::SettingsClosed)?
                .udp_port()?,
        };
        handshake.advance(HandshakeState::SettingsNegotiated);

        let latency_settings = initial.latency.clamped(config.latency_bounds);
        info!(
            "Spawned at {} with latency {}",
            initial.spawn, latency_settings
        );

        let control_addr = resolve(&config.server_host, control_port).await?;
        let bind_addr: SocketAddr = if control_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        let server_data_addr = handshake.rendezvous(&socket, control_addr).await?;
        info!(
            "Data channel bound: {} <-> {}",
            socket.local_addr()?,
            server_data_addr
        );

        let latency = Arc::new(RwLock::new(latency_settings));
        let data = Arc::new(socket);
        let (settings_rx, settings_tx) = stream.into_split();

        let settings_task = {
            let latency = Arc::clone(&latency);
            let bounds = config.latency_bounds;
            tokio::spawn(async move {
                match run_settings_reader(settings_rx, latency, bounds).await {
                    Ok(()) => info!("Settings channel closed by server"),
                    Err(e) => error!("Settings channel terminated: {}", e),
                }
            })
        };

        let (position_tx, position_rx) = watch::channel(initial.spawn);
        let state_task = tokio::spawn(receive_states(Arc::clone(&data), position_tx));

        Ok(Self {
            data,
            server_data_addr,
            simulator: LatencySimulator::new(Arc::clone(&latency)),
            latency,
            bounds: config.latency_bounds,
            settings: SettingsWriter::new(settings_tx),
            position_rx,
            handshake,
            settings_task,
            state_task,
        })
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.state()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.data.local_addr()
    }

    /// Address of the server's per-client data socket
    pub fn server_data_addr(&self) -> SocketAddr {
        self.server_data_addr
    }

    /// Latest position received from the server
    pub fn position(&self) -> Position {
        *self.position_rx.borrow()
    }

    /// Receiver that observes every position update from the server.
    pub fn subscribe(&self) -> watch::Receiver<Position> {
        self.position_rx.clone()
    }

    pub async fn latency(&self) -> LatencySettings {
        *self.latency.read().await
    }

    pub fn simulator(&self) -> &LatencySimulator {
        &self.simulator
    }

    /// Replaces the local settings and pushes them to the server.
    ///
    /// Returns the settings after clamping to the configured bounds.
    pub async fn set_latency(&self, settings: LatencySettings) -> LatencySettings {
        let applied = settings.clamped(self.bounds);
        *self.latency.write().await = applied;
        self.settings.push(applied).await;
        info!("Client latency settings changed: {}", applied);
        applied
    }

    /// Enqueues one input frame behind the artificial delay.
    ///
    /// Returns the delay attached to this frame; the call itself does not
    /// wait for it.
    pub async fn send_input(&self, frame: InputFrame) -> Duration {
        match frame.encode() {
            Ok(payload) => {
                self.simulator
                    .send_delayed(Arc::clone(&self.data), payload)
                    .await
            }
            Err(e) => {
                error!("Failed to encode input frame: {}", e);
                Duration::ZERO
            }
        }
    }

    /// Whether the state receive loop is still running.
    pub fn is_receiving(&self) -> bool {
        !self.state_task.is_finished()
    }

    /// Whether the settings reader is still running.
    pub fn settings_open(&self) -> bool {
        !self.settings_task.is_finished()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Releases the sockets held by the background loops.
        self.state_task.abort();
        self.settings_task.abort();
    }
}

/// Mirrors every state update into `position_tx` until the socket fails.
async fn receive_states(socket: Arc<UdpSocket>, position_tx: watch::Sender<Position>) {
    let mut buffer = [0u8; 2048];

    loop {
        match socket.recv(&mut buffer).await {
            Ok(len) => match Position::decode(&buffer[..len]) {
                Ok(position) => {
                    position_tx.send_replace(position);
                }
                Err(e) => warn!("Dropping datagram from server: {}", e),
            },
            Err(e) => {
                error!("Data channel failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::settings::write_message;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_host, "127.0.0.1");
        assert_eq!(config.control_port, 8080);
        assert_eq!(config.settings_port, 8081);
        assert_eq!(config.tick_rate, 60);
    }

    /// Minimal server that negotiates settings and answers CONNECT with `reply`.
    async fn fake_server(reply: &'static [u8]) -> (ClientConfig, JoinHandle<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            settings_port: listener.local_addr().unwrap().port(),
            control_port: control.local_addr().unwrap().port(),
            ..ClientConfig::default()
        };

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let initial = InitialSettings {
                latency: LatencySettings::new(100, 10),
                spawn: Position::new(10, 20),
            };
            write_message(&mut stream, &initial).await.unwrap();

            let mut buf = [0u8; 64];
            let (_, from) = control.recv_from(&mut buf).await.unwrap();
            control.send_to(reply, from).await.unwrap();
            stream
        });

        (config, task)
    }

    #[tokio::test]
    async fn test_connect_applies_initial_settings() {
        let (config, server) = fake_server(shared::ACK_TOKEN).await;
        let client = timeout(Duration::from_secs(2), Client::connect(&config))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(client.handshake_state(), HandshakeState::Bound);
        assert_eq!(client.position(), Position::new(10, 20));
        assert_eq!(client.latency().await, LatencySettings::new(100, 10));
        assert!(client.is_receiving());

        let _stream = server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_fails_on_wrong_ack() {
        let (config, _server) = fake_server(b"GameNetBasics: NOPE").await;
        let result = timeout(Duration::from_secs(2), Client::connect(&config))
            .await
            .unwrap();

        assert!(matches!(
            result,
            Err(HandshakeError::UnexpectedToken { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_when_settings_channel_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            settings_port: listener.local_addr().unwrap().port(),
            ..ClientConfig::default()
        };
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let result = timeout(Duration::from_secs(2), Client::connect(&config))
            .await
            .unwrap();
        assert!(matches!(result, Err(HandshakeError::SettingsClosed)));
    }
}
