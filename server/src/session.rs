//! Per-client session state and the registry of active sessions
//!
//! A session only exists once its handshake has fully completed: the data
//! socket is connected to the client and the ACK has been sent. The registry
//! is guarded by one coarse lock for membership changes, while every session
//! synchronizes its own position, latency settings and input buffer.

use log::info;
use shared::settings::SettingsWriter;
use shared::{InputFrame, LatencySettings, LatencySimulator, Position, SharedLatency};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, RwLock};

/// One connected client
pub struct ClientSession {
    /// Identifier assigned by the registry
    pub id: u32,
    /// Client endpoint the data socket is connected to
    pub peer: SocketAddr,
    /// Private UDP socket carrying input frames in and state updates out
    pub data: Arc<UdpSocket>,
    position: RwLock<Position>,
    latency: SharedLatency,
    simulator: LatencySimulator,
    pending_inputs: Mutex<Vec<InputFrame>>,
    settings: Option<SettingsWriter<OwnedWriteHalf>>,
}

impl ClientSession {
    pub fn new(
        id: u32,
        peer: SocketAddr,
        data: Arc<UdpSocket>,
        spawn: Position,
        latency: LatencySettings,
        settings: Option<SettingsWriter<OwnedWriteHalf>>,
    ) -> Self {
        let latency = Arc::new(RwLock::new(latency));
        Self {
            id,
            peer,
            data,
            position: RwLock::new(spawn),
            simulator: LatencySimulator::new(Arc::clone(&latency)),
            latency,
            pending_inputs: Mutex::new(Vec::new()),
            settings,
        }
    }

    pub async fn position(&self) -> Position {
        *self.position.read().await
    }

    pub async fn set_position(&self, position: Position) {
        *self.position.write().await = position;
    }

    pub async fn latency(&self) -> LatencySettings {
        *self.latency.read().await
    }

    /// Shared handle a settings reader writes peer updates into.
    pub fn shared_latency(&self) -> SharedLatency {
        Arc::clone(&self.latency)
    }

    pub fn simulator(&self) -> &LatencySimulator {
        &self.simulator
    }

    /// Replaces the local settings and pushes them to the client.
    pub async fn set_latency(&self, settings: LatencySettings) {
        *self.latency.write().await = settings;
        if let Some(writer) = &self.settings {
            writer.push(settings).await;
        }
    }

    /// Buffers a frame in arrival order.
    pub async fn push_input(&self, frame: InputFrame) {
        self.pending_inputs.lock().await.push(frame);
    }

    /// Takes every frame buffered since the last drain.
    pub async fn drain_inputs(&self) -> Vec<InputFrame> {
        std::mem::take(&mut *self.pending_inputs.lock().await)
    }
}

/// Active sessions indexed by client id
///
/// Capacity counts registered sessions plus reserved slots. A slot is
/// reserved when a settings channel is accepted and is either consumed by
/// `register` or given back with `release`.
pub struct SessionRegistry {
    sessions: HashMap<u32, Arc<ClientSession>>,
    next_client_id: u32,
    max_clients: usize,
    reserved: usize,
}

impl SessionRegistry {
    /// Client IDs start from 1 and increment for each registration.
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_client_id: 1,
            max_clients,
            reserved: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() + self.reserved >= self.max_clients
    }

    /// Claims a slot for a handshake in progress; `false` when full.
    pub fn reserve(&mut self) -> bool {
        if self.is_full() {
            return false;
        }
        self.reserved += 1;
        true
    }

    /// Gives back a slot whose handshake did not complete.
    pub fn release(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    /// Assigns the next id and publishes the session built from it.
    ///
    /// Consumes one reserved slot. Returns `None` without consuming an id
    /// if no slot was reserved.
    pub fn register<F>(&mut self, build: F) -> Option<Arc<ClientSession>>
    where
        F: FnOnce(u32) -> ClientSession,
    {
        if self.reserved == 0 {
            return None;
        }
        self.reserved -= 1;

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let session = Arc::new(build(client_id));
        info!("Client {} registered from {}", client_id, session.peer);
        self.sessions.insert(client_id, Arc::clone(&session));

        Some(session)
    }

    pub fn remove(&mut self, client_id: u32) -> Option<Arc<ClientSession>> {
        let removed = self.sessions.remove(&client_id);
        if removed.is_some() {
            info!("Client {} removed", client_id);
        }
        removed
    }

    /// Snapshot of the active sessions ordered by id
    pub fn sessions(&self) -> Vec<Arc<ClientSession>> {
        let mut sessions: Vec<_> = self.sessions.values().cloned().collect();
        sessions.sort_by_key(|session| session.id);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
