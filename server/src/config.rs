use shared::{
    HandshakeVariant, LatencyBounds, LatencySettings, Position, CONTROL_PORT, PLAYER_SPEED,
    SERVER_HOST, SERVER_TICK_RATE, SETTINGS_PORT,
};
use std::time::Duration;

/// Runtime configuration of the authoritative server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address every server socket binds to
    pub host: String,
    /// Well-known UDP control port (0 picks an ephemeral port)
    pub control_port: u16,
    /// Well-known TCP settings port (0 picks an ephemeral port)
    pub settings_port: u16,
    pub tick_rate: u32,
    pub speed: i32,
    pub variant: HandshakeVariant,
    /// Settings every new session starts with
    pub initial_latency: LatencySettings,
    pub latency_bounds: LatencyBounds,
    pub spawn: Position,
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: SERVER_HOST.to_string(),
            control_port: CONTROL_PORT,
            settings_port: SETTINGS_PORT,
            tick_rate: SERVER_TICK_RATE,
            speed: PLAYER_SPEED,
            variant: HandshakeVariant::default(),
            initial_latency: LatencySettings::default(),
            latency_bounds: LatencyBounds::default(),
            spawn: Position::spawn(),
            max_clients: 1,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.host, self.control_port)
    }

    pub fn settings_addr(&self) -> String {
        format!("{}:{}", self.host, self.settings_port)
    }
}
