//! Server network layer: settings channels, UDP rendezvous, per-client input
//! loops and the fixed-rate simulation tick

use crate::config::ServerConfig;
use crate::handshake::{self, HandshakeError};
use crate::session::{ClientSession, SessionRegistry};
use crate::simulation;
use log::{debug, error, info, warn};
use shared::settings::{run_settings_reader, write_message, SettingsWriter};
use shared::{
    FixedLayout, HandshakeVariant, InitialSettings, InputFrame, LatencySettings, PortAssignment,
    Position,
};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// A settings channel that has received its initial settings and is waiting
/// for the matching UDP handshake
///
/// Every pending link holds one reserved registry slot. The read half stays
/// with a watcher task until a CONNECT claims the link.
struct PendingLink {
    id: u64,
    peer: SocketAddr,
    writer: OwnedWriteHalf,
    claim: oneshot::Sender<()>,
    reader: JoinHandle<Option<OwnedReadHalf>>,
}

/// State shared by every server task
#[derive(Clone)]
struct ServerContext {
    config: Arc<ServerConfig>,
    sessions: Arc<RwLock<SessionRegistry>>,
    pending: Arc<Mutex<VecDeque<PendingLink>>>,
    next_link_id: Arc<AtomicU64>,
    default_latency: Arc<RwLock<LatencySettings>>,
}

/// Operator-facing handle onto a running server
#[derive(Clone)]
pub struct ServerHandle {
    sessions: Arc<RwLock<SessionRegistry>>,
    pending: Arc<Mutex<VecDeque<PendingLink>>>,
    default_latency: Arc<RwLock<LatencySettings>>,
    config: Arc<ServerConfig>,
}

impl ServerHandle {
    pub async fn sessions(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.read().await.sessions()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Settings channels still waiting for their CONNECT
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn latency(&self) -> LatencySettings {
        *self.default_latency.read().await
    }

    /// Applies new settings locally and pushes them to every client.
    ///
    /// Sessions registered later start with these settings too. Returns the
    /// settings after clamping to the configured bounds.
    pub async fn set_latency(&self, settings: LatencySettings) -> LatencySettings {
        let applied = settings.clamped(self.config.latency_bounds);
        *self.default_latency.write().await = applied;

        for session in self.sessions().await {
            session.set_latency(applied).await;
        }
        info!("Server latency settings changed: {}", applied);
        applied
    }
}

/// Authoritative server owning the well-known sockets
pub struct Server {
    context: ServerContext,
    control: Option<Arc<UdpSocket>>,
    settings_listener: TcpListener,
}

impl Server {
    /// Binds the settings listener and, for the shared-control variant, the
    /// control socket.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let settings_listener = TcpListener::bind(config.settings_addr()).await?;
        info!(
            "Settings channel listening on {}",
            settings_listener.local_addr()?
        );

        let control = match config.variant {
            HandshakeVariant::SharedControl => {
                let socket = UdpSocket::bind(config.control_addr()).await?;
                info!("Control channel listening on {}", socket.local_addr()?);
                Some(Arc::new(socket))
            }
            HandshakeVariant::DedicatedPort => None,
        };

        let default_latency = config.initial_latency.clamped(config.latency_bounds);
        let context = ServerContext {
            sessions: Arc::new(RwLock::new(SessionRegistry::new(config.max_clients))),
            pending: Arc::new(Mutex::new(VecDeque::new())),
            next_link_id: Arc::new(AtomicU64::new(1)),
            default_latency: Arc::new(RwLock::new(default_latency)),
            config: Arc::new(config),
        };

        Ok(Self {
            context,
            control,
            settings_listener,
        })
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
    }

    pub fn settings_addr(&self) -> io::Result<SocketAddr> {
        self.settings_listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            sessions: Arc::clone(&self.context.sessions),
            pending: Arc::clone(&self.context.pending),
            default_latency: Arc::clone(&self.context.default_latency),
            config: Arc::clone(&self.context.config),
        }
    }

    /// Spawns the listener tasks and runs the simulation tick loop.
    pub async fn run(self) -> io::Result<()> {
        let Server {
            context,
            control,
            settings_listener,
        } = self;

        tokio::spawn(accept_settings_channels(settings_listener, context.clone()));
        if let Some(control) = control {
            tokio::spawn(listen_for_connects(control, context.clone()));
        }

        info!(
            "Server started ({:?} handshake, {}Hz tick)",
            context.config.variant, context.config.tick_rate
        );
        run_ticks(context).await;
        Ok(())
    }
}

async fn accept_settings_channels(listener: TcpListener, context: ServerContext) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(e) = context.negotiate(stream, peer).await {
                        warn!("Connection setup with {} aborted: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                error!("Settings listener failed: {}", e);
                break;
            }
        }
    }
}

/// Receives CONNECT tokens on the shared control socket.
async fn listen_for_connects(control: Arc<UdpSocket>, context: ServerContext) {
    let mut buffer = [0u8; 2048];

    loop {
        match control.recv_from(&mut buffer).await {
            Ok((len, addr)) => {
                if !handshake::is_connect(&buffer[..len]) {
                    warn!("Ignoring {} unexpected bytes on control port from {}", len, addr);
                    continue;
                }

                let Some(link) = context.take_pending(addr).await else {
                    warn!("CONNECT from {} has no pending settings channel", addr);
                    continue;
                };

                debug!("CONNECT from {}", addr);
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(e) = context.complete_shared_handshake(link, addr).await {
                        warn!("Handshake with {} failed: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Control socket failed: {}", e);
                break;
            }
        }
    }
}

/// Resolves once the peer closes the settings channel or it fails.
async fn wait_for_close(reader: &mut OwnedReadHalf) {
    let mut probe = [0u8; 1];
    match reader.peek(&mut probe).await {
        Ok(0) | Err(_) => {}
        // Early bytes stay queued for the settings reader
        Ok(_) => std::future::pending::<()>().await,
    }
}

/// Holds the read half of a pending link until a CONNECT claims it.
///
/// If the peer disconnects first, the link leaves the queue and its slot is
/// released.
async fn watch_pending(
    mut reader: OwnedReadHalf,
    mut claimed: oneshot::Receiver<()>,
    context: ServerContext,
    id: u64,
) -> Option<OwnedReadHalf> {
    tokio::select! {
        result = &mut claimed => return result.ok().map(|()| reader),
        _ = wait_for_close(&mut reader) => {}
    }

    if context.drop_pending(id).await {
        return None;
    }

    // Claimed while the peer was disconnecting
    claimed.await.ok().map(|()| reader)
}

impl ServerContext {
    /// Reserves a registry slot and negotiates the settings channel.
    ///
    /// The slot stays reserved until the session is registered or the
    /// handshake fails, so an ACK is only ever sent for a session that will
    /// be published.
    async fn negotiate(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), HandshakeError> {
        if !self.sessions.write().await.reserve() {
            info!("Refusing settings channel from {}: server full", peer);
            return Err(HandshakeError::Full);
        }

        let result = match self.config.variant {
            HandshakeVariant::SharedControl => self.queue_pending(stream, peer).await,
            HandshakeVariant::DedicatedPort => self.negotiate_dedicated(stream, peer).await,
        };

        if result.is_err() {
            self.sessions.write().await.release();
        }
        result
    }

    async fn initial_settings(&self) -> InitialSettings {
        InitialSettings {
            latency: *self.default_latency.read().await,
            spawn: self.config.spawn,
        }
    }

    async fn queue_pending(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<(), HandshakeError> {
        let initial = self.initial_settings().await;

        // The queue stays locked until this link is in it, so a CONNECT that
        // follows the initial settings always finds the link.
        let mut pending = self.pending.lock().await;
        write_message(&mut stream, &initial).await?;

        let (reader, writer) = stream.into_split();
        let id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
        let (claim, claimed) = oneshot::channel();
        let reader = tokio::spawn(watch_pending(reader, claimed, self.clone(), id));

        pending.push_back(PendingLink {
            id,
            peer,
            writer,
            claim,
            reader,
        });
        debug!("Settings negotiated with {}, awaiting CONNECT", peer);
        Ok(())
    }

    async fn negotiate_dedicated(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), HandshakeError> {
        let socket = handshake::open_data_socket(&self.config.host).await?;
        let port = socket.local_addr()?.port();

        write_message(&mut stream, &self.initial_settings().await).await?;
        write_message(&mut stream, &PortAssignment::new(port)).await?;
        debug!("Settings negotiated with {}, dedicated port {}", peer, port);

        let (mut reader, writer) = stream.into_split();
        let client = tokio::select! {
            client = handshake::await_connect(&socket) => client?,
            _ = wait_for_close(&mut reader) => return Err(HandshakeError::Abandoned),
        };

        handshake::acknowledge(&socket, client).await?;
        self.publish(peer, reader, writer, socket, client).await
    }

    /// Takes the oldest pending settings channel opened from the same host.
    async fn take_pending(&self, addr: SocketAddr) -> Option<PendingLink> {
        let mut pending = self.pending.lock().await;
        let index = pending
            .iter()
            .position(|link| link.peer.ip() == addr.ip())?;
        pending.remove(index)
    }

    /// Removes a link whose peer went away and releases its slot.
    ///
    /// Returns `false` if a CONNECT already took the link.
    async fn drop_pending(&self, id: u64) -> bool {
        let mut pending = self.pending.lock().await;
        let Some(index) = pending.iter().position(|link| link.id == id) else {
            return false;
        };

        if let Some(link) = pending.remove(index) {
            info!("Settings channel from {} closed before CONNECT", link.peer);
        }
        self.sessions.write().await.release();
        true
    }

    async fn complete_shared_handshake(
        &self,
        link: PendingLink,
        client: SocketAddr,
    ) -> Result<(), HandshakeError> {
        let result = self.bind_pending(link, client).await;
        if result.is_err() {
            self.sessions.write().await.release();
        }
        result
    }

    async fn bind_pending(&self, link: PendingLink, client: SocketAddr) -> Result<(), HandshakeError> {
        let PendingLink {
            peer,
            writer,
            claim,
            reader,
            ..
        } = link;

        // The watcher only exits on its own after removing the link, so it
        // is still waiting for this claim.
        let _ = claim.send(());
        let reader = match reader.await {
            Ok(Some(reader)) => reader,
            _ => return Err(HandshakeError::Abandoned),
        };

        let socket = handshake::open_data_socket(&self.config.host).await?;
        handshake::acknowledge(&socket, client).await?;
        self.publish(peer, reader, writer, socket, client).await
    }

    /// Registers a session whose data socket is connected and acknowledged,
    /// then starts its input and settings loops.
    ///
    /// Consumes the slot reserved during negotiation.
    async fn publish(
        &self,
        peer: SocketAddr,
        settings_rx: OwnedReadHalf,
        settings_tx: OwnedWriteHalf,
        socket: UdpSocket,
        client: SocketAddr,
    ) -> Result<(), HandshakeError> {
        let local = socket.local_addr()?;
        let data = Arc::new(socket);
        let latency = *self.default_latency.read().await;
        let spawn = self.config.spawn;

        let session = self
            .sessions
            .write()
            .await
            .register(|id| {
                ClientSession::new(
                    id,
                    client,
                    data,
                    spawn,
                    latency,
                    Some(SettingsWriter::new(settings_tx)),
                )
            })
            .ok_or(HandshakeError::Full)?;

        info!(
            "Client {} bound: data {} <-> {}, settings {}",
            session.id, local, client, peer
        );

        let id = session.id;
        let bounds = self.config.latency_bounds;
        let latency = session.shared_latency();
        tokio::spawn(async move {
            match run_settings_reader(settings_rx, latency, bounds).await {
                Ok(()) => info!("Settings channel for client {} closed", id),
                Err(e) => error!("Settings channel for client {} terminated: {}", id, e),
            }
        });

        tokio::spawn(receive_inputs(session, Arc::clone(&self.sessions)));
        Ok(())
    }
}

/// Buffers every input frame the client sends until its socket fails.
async fn receive_inputs(session: Arc<ClientSession>, sessions: Arc<RwLock<SessionRegistry>>) {
    let mut buffer = [0u8; 2048];

    loop {
        match session.data.recv(&mut buffer).await {
            Ok(len) => match InputFrame::decode(&buffer[..len]) {
                Ok(frame) => session.push_input(frame).await,
                Err(e) => warn!("Dropping datagram from client {}: {}", session.id, e),
            },
            Err(e) => {
                error!("Data channel for client {} failed: {}", session.id, e);
                sessions.write().await.remove(session.id);
                break;
            }
        }
    }
}

async fn run_ticks(context: ServerContext) {
    let mut tick_interval = interval(context.config.tick_duration());
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let speed = context.config.speed;
    let mut tick: u64 = 0;

    // Skip the first tick since it fires immediately
    tick_interval.tick().await;

    loop {
        tick_interval.tick().await;
        tick += 1;

        let sessions = {
            let registry = context.sessions.read().await;
            if registry.is_empty() {
                continue;
            }
            registry.sessions()
        };
        for session in &sessions {
            tick_session(session, speed).await;
        }

        if tick % (context.config.tick_rate.max(1) as u64 * 10) == 0 {
            debug!("Tick {}: {} clients", tick, sessions.len());
        }
    }
}

/// One simulation step for one client followed by its state update.
///
/// The update is enqueued every tick, whether or not the position changed.
pub async fn tick_session(session: &ClientSession, speed: i32) -> Position {
    let frames = session.drain_inputs().await;
    let mut position = session.position().await;

    if !frames.is_empty() {
        position = simulation::step(position, &frames, speed);
        session.set_position(position).await;
    }

    match position.encode() {
        Ok(payload) => {
            session
                .simulator()
                .send_delayed(Arc::clone(&session.data), payload)
                .await;
        }
        Err(e) => error!("Failed to encode state for client {}: {}", session.id, e),
    }

    position
}
