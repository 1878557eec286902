//! Artificial one-way delay for outbound application messages.

use crate::LatencySettings;
use log::{debug, error};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::time::sleep;

/// Latency settings shared between a settings reader and the send path.
pub type SharedLatency = Arc<RwLock<LatencySettings>>;

/// Samples `max(rtt / 2 + U(-jitter, jitter), 0)` milliseconds.
///
/// `U` is a uniform integer draw inclusive of both bounds.
pub fn sample_delay<R: Rng>(settings: LatencySettings, rng: &mut R) -> Duration {
    let one_way = settings.roundtrip_delay_ms.max(0) / 2;
    let jitter = settings.jitter_ms.max(0);
    let offset = if jitter > 0 {
        rng.gen_range(-jitter..=jitter)
    } else {
        0
    };

    let millis = (one_way as i64 + offset as i64).max(0);
    Duration::from_millis(millis as u64)
}

/// Delays each outbound datagram on its own detached task.
///
/// The delay is sampled when the message is enqueued, from the settings in
/// effect at that moment. Messages with different delays may reach the wire
/// out of enqueue order.
#[derive(Debug, Clone)]
pub struct LatencySimulator {
    settings: SharedLatency,
}

impl LatencySimulator {
    pub fn new(settings: SharedLatency) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SharedLatency {
        &self.settings
    }

    /// Samples the delay the next enqueued message would get.
    pub async fn next_delay(&self) -> Duration {
        let settings = *self.settings.read().await;
        sample_delay(settings, &mut rand::thread_rng())
    }

    /// Sends `payload` on a connected socket after the sampled delay.
    ///
    /// Returns immediately with the delay attached to this message. Send
    /// failures are logged by the detached task.
    pub async fn send_delayed(&self, socket: Arc<UdpSocket>, payload: Vec<u8>) -> Duration {
        let delay = self.next_delay().await;

        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            match socket.send(&payload).await {
                Ok(_) => debug!("Sent {} bytes after {}ms", payload.len(), delay.as_millis()),
                Err(e) => error!("Delayed send failed: {}", e),
            }
        });

        delay
    }
}
