//! Server side of the UDP rendezvous.
//!
//! The ACK is always sent from the client's private data socket, never from
//! the shared control socket, so the client pins its data channel to the
//! socket that will carry its game traffic.

use shared::{WireError, ACK_TOKEN, CONNECT_TOKEN};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("expected CONNECT from {peer}, got {len} unexpected bytes")]
    UnexpectedToken { peer: SocketAddr, len: usize },
    #[error("server is full")]
    Full,
    #[error("settings channel closed before the handshake completed")]
    Abandoned,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn is_connect(payload: &[u8]) -> bool {
    payload == CONNECT_TOKEN
}

/// Opens a fresh UDP socket on `host` for one client.
pub async fn open_data_socket(host: &str) -> io::Result<UdpSocket> {
    UdpSocket::bind((host, 0)).await
}

/// Connects `socket` to the client's observed endpoint and sends the ACK.
pub async fn acknowledge(socket: &UdpSocket, client: SocketAddr) -> io::Result<()> {
    socket.connect(client).await?;
    socket.send(ACK_TOKEN).await?;
    Ok(())
}

/// Waits on a dedicated socket for the client's CONNECT.
///
/// The first datagram decides the handshake: anything other than the
/// CONNECT token aborts it.
pub async fn await_connect(socket: &UdpSocket) -> Result<SocketAddr, HandshakeError> {
    let mut buf = [0u8; 256];
    let (len, peer) = socket.recv_from(&mut buf).await?;
    if !is_connect(&buf[..len]) {
        return Err(HandshakeError::UnexpectedToken { peer, len });
    }
    Ok(peer)
}
