//! UDP transport: receive datagrams, decode them and hand them to the registry

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ServerConfig, SourceRestriction};
use crate::handler::Handler;
use crate::record::HeartbeatRecord;
use crate::registry::{Registry, RegistryHandle};
use crate::Result;

/// A bound watchdog listener with its registry already running
pub struct WatchdogServer {
    socket: UdpSocket,
    config: ServerConfig,
    registry: RegistryHandle,
    registry_task: JoinHandle<()>,
}

impl WatchdogServer {
    /// Bind the listen address and start the registry.
    ///
    /// Failing to bind is the only fatal startup error.
    pub async fn bind(config: &Config, handler: Arc<dyn Handler>) -> Result<Self> {
        let socket = UdpSocket::bind(&config.server.listen_addr).await?;
        let (registry, registry_task) = Registry::spawn(config.defaults.clone(), handler);
        info!("Listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            config: config.server.clone(),
            registry,
            registry_task,
        })
    }

    /// The address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Handle to the registry behind this listener
    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Receive datagrams until `shutdown` is cancelled.
    ///
    /// Read errors are logged and skipped; one bad read must not stop
    /// tracking for every other key.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; self.config.max_datagram_size];
        let mut filter = SourceFilter::new(self.config.restrict_source);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Listener shutting down");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((0, peer)) => {
                        debug!("Ignoring empty datagram from {}", peer);
                    }
                    Ok((len, peer)) => {
                        if !filter.accept(peer) {
                            warn!("Dropping datagram from {} (restricted to {})", peer, filter.describe());
                            continue;
                        }
                        let payload = payload_text(&buf[..len]);
                        let record = HeartbeatRecord::decode(&payload, peer.to_string());
                        debug!("Received {:?} from {} for '{}'", payload, peer, record.key);
                        self.registry.submit(record)?;
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                    }
                }
            }
        }

        // Already gone is fine: we are stopping anyway.
        let _ = self.registry.shutdown();
        if let Err(e) = self.registry_task.await {
            error!("Registry task failed: {}", e);
        }
        Ok(())
    }
}

/// Strip one trailing newline (and a preceding carriage return) and decode
/// the rest as UTF-8, replacing invalid sequences.
fn payload_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = match bytes.strip_suffix(b"\n") {
        Some(rest) => rest.strip_suffix(b"\r").unwrap_or(rest),
        None => bytes,
    };
    String::from_utf8_lossy(bytes)
}

/// Pins the first accepted sender and rejects others per the restriction
struct SourceFilter {
    restriction: SourceRestriction,
    pinned: Option<SocketAddr>,
}

impl SourceFilter {
    fn new(restriction: SourceRestriction) -> Self {
        Self {
            restriction,
            pinned: None,
        }
    }

    fn accept(&mut self, peer: SocketAddr) -> bool {
        match (self.restriction, self.pinned) {
            (SourceRestriction::None, _) => true,
            (_, None) => {
                info!("Accepting heartbeats only from {}", peer);
                self.pinned = Some(peer);
                true
            }
            (SourceRestriction::Ip, Some(pinned)) => pinned.ip() == peer.ip(),
            (SourceRestriction::IpPort, Some(pinned)) => pinned == peer,
        }
    }

    fn describe(&self) -> String {
        match (self.restriction, self.pinned) {
            (SourceRestriction::Ip, Some(pinned)) => pinned.ip().to_string(),
            (_, Some(pinned)) => pinned.to_string(),
            (_, None) => "anyone".to_string(),
        }
    }
}
