//! Settings channel primitives (TCP, one per client).
//!
//! Each fixed-layout message is read with a single `read` call into a buffer
//! of exactly the expected width. Zero bytes means the peer shut down;
//! anything short of the full width is a framing error and leaves the stream
//! unusable, so the reader loop ends.

use crate::wire::{FixedLayout, WireError};
use crate::{LatencyBounds, LatencySettings, SharedLatency};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Reads one message of type `T`.
///
/// Returns `Ok(None)` on orderly shutdown of the peer.
pub async fn read_message<T, R>(reader: &mut R) -> Result<Option<T>, WireError>
where
    T: FixedLayout,
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; T::LEN];
    let len = reader.read(&mut buf).await?;
    if len == 0 {
        return Ok(None);
    }

    T::decode(&buf[..len]).map(Some)
}

pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    T: FixedLayout,
    W: AsyncWrite + Unpin,
{
    let bytes = message.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Applies every settings update the peer sends until it disconnects.
///
/// Each update is clamped to `bounds` and replaces the local settings
/// wholesale. Returns `Ok(())` when the peer closes the stream and `Err` on a
/// framing or transport error.
pub async fn run_settings_reader<R>(
    mut reader: R,
    latency: SharedLatency,
    bounds: LatencyBounds,
) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message::<LatencySettings, _>(&mut reader).await? {
            Some(update) => {
                let applied = update.clamped(bounds);
                *latency.write().await = applied;
                info!("Peer updated latency settings: {}", applied);
            }
            None => {
                debug!("Settings channel closed by peer");
                return Ok(());
            }
        }
    }
}

/// Write side of a settings channel, shared by everything that may push an
/// update to the peer.
pub struct SettingsWriter<W> {
    inner: Mutex<W>,
}

impl<W> SettingsWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Fire-and-forget write of the local settings to the peer.
    ///
    /// Failures are logged and not retried. Returns whether the write went
    /// through.
    pub async fn push(&self, settings: LatencySettings) -> bool {
        let mut writer = self.inner.lock().await;
        match write_message(&mut *writer, &settings).await {
            Ok(()) => {
                debug!("Pushed latency settings to peer: {}", settings);
                true
            }
            Err(e) => {
                warn!("Failed to push latency settings to peer: {}", e);
                false
            }
        }
    }
}
