//! Minimal heartbeat sender

use std::io;

use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use crate::Result;

/// Send one payload to a watchdog listener and return the bytes written
pub async fn send_heartbeat(endpoint: &str, payload: &str) -> Result<usize> {
    let target = lookup_host(endpoint).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("could not resolve {}", endpoint),
        )
    })?;

    let bind_addr = if target.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(target).await?;
    let sent = socket.send(payload.as_bytes()).await?;
    debug!("Sent {} bytes to {}", sent, target);
    Ok(sent)
}
