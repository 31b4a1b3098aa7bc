//! # Directory Sources
//!
//! A directory source is one master server that knows which game servers are
//! currently online. It is polled at its configured cooldown and keeps the
//! listing of the last successful poll.
//!
//! - **`HttpDirectory`**: DDNet style `servers.json` over HTTP(S).
//! - **`UdpDirectory`**: the Teeworlds 0.6 connless browser protocol, first
//!   asking the master for addresses and then every game server for its info.

mod http;
pub mod packet;
mod udp;

use crate::{
    diagnostics::SharedDiagnostics,
    registry::{
        RegistryError,
        Source,
    },
    server::GameServer,
};
use parking_lot::Mutex;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use strum::{
    AsRefStr,
    Display,
    EnumString,
};
use tokio_util::sync::CancellationToken;

pub use self::{
    http::HttpDirectory,
    packet::PacketError,
    udp::{
        UdpDirectory,
        UdpSettings,
    },
};

/// Default upper bound for a single poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Udp,
}

/// Identity of a master server: its protocol and address (the URL for HTTP,
/// `host:port` for UDP).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirectoryId {
    pub protocol: Protocol,
    pub address: String,
}

impl DirectoryId {
    pub fn new(protocol: Protocol, address: impl Into<String>) -> Self {
        Self {
            protocol,
            address: address.into(),
        }
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} master {}", self.protocol, self.address)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("master server answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("master server did not answer within {0:?}")]
    NoResponse(Duration),
    #[error("poll timed out after {0:?}")]
    Timeout(Duration),
}

/// The protocol specific half of a directory source.
pub trait DirectoryProtocol: Send + Sync + 'static {
    fn id(&self) -> DirectoryId;

    /// Fetches the complete current listing. Implementations must not keep any
    /// partial state between calls.
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Vec<GameServer>, FetchError>> + Send + '_>>;
}

/// How well refreshing a directory went so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    /// Duration of the most recent successful poll.
    pub request_duration: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    pub id: DirectoryId,
    pub servers: Arc<Vec<GameServer>>,
    pub metrics: DirectoryMetrics,
}

impl DirectorySnapshot {
    pub fn player_count(&self) -> usize {
        self.servers.iter().map(GameServer::player_count).sum()
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    servers: Arc<Vec<GameServer>>,
    metrics: DirectoryMetrics,
}

/// A master server together with the listing of its last successful poll.
pub struct DirectorySource {
    id: DirectoryId,
    protocol: Box<dyn DirectoryProtocol>,
    poll_timeout: Duration,
    diagnostics: SharedDiagnostics,
    state: Mutex<DirectoryState>,
}

impl fmt::Debug for DirectorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySource")
            .field("id", &self.id)
            .field("poll_timeout", &self.poll_timeout)
            .field("metrics", &self.metrics())
            .finish_non_exhaustive()
    }
}

impl DirectorySource {
    pub fn new(protocol: impl DirectoryProtocol, poll_timeout: Duration, diagnostics: SharedDiagnostics) -> Self {
        Self {
            id: protocol.id(),
            protocol: Box::new(protocol),
            poll_timeout,
            diagnostics,
            state: Default::default(),
        }
    }

    pub fn metadata(&self) -> &DirectoryId {
        &self.id
    }

    pub fn servers(&self) -> Arc<Vec<GameServer>> {
        self.state.lock().servers.clone()
    }

    pub fn metrics(&self) -> DirectoryMetrics {
        self.state.lock().metrics
    }

    /// Polls the master once.
    ///
    /// On success the listing, the success counter and the duration are
    /// replaced together. On failure only the failure counter moves and the
    /// previous listing is kept.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.poll_timeout, self.protocol.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.poll_timeout)),
        };
        let elapsed = start.elapsed();

        let mut state = self.state.lock();
        match result {
            Ok(servers) => {
                trace!(source = %self.id, servers = servers.len(), ?elapsed, "refreshed");
                state.servers = Arc::new(servers);
                state.metrics.success_count += 1;
                state.metrics.request_duration = Some(elapsed);
                Ok(())
            }
            Err(err) => {
                state.metrics.failure_count += 1;
                Err(err)
            }
        }
    }
}

impl Source for DirectorySource {
    type Id = DirectoryId;
    /// Cooldown between the end of one poll and the start of the next.
    type Schedule = Duration;
    type Snapshot = DirectorySnapshot;

    fn id(&self) -> DirectoryId {
        self.id.clone()
    }

    fn check_schedule(&self, cooldown: &Duration) -> Result<(), RegistryError> {
        if cooldown.is_zero() {
            return Err(RegistryError::InvalidSource {
                source_id: self.id.to_string(),
                reason: "the refresh cooldown must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    fn snapshot(&self) -> DirectorySnapshot {
        let state = self.state.lock();
        DirectorySnapshot {
            id: self.id.clone(),
            servers: state.servers.clone(),
            metrics: state.metrics,
        }
    }

    fn run(
        self: Arc<Self>,
        cooldown: Duration,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        Box::pin(async move {
            debug!(source = %self.id, ?cooldown, "starting refresh loop");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = self.refresh() => {
                        if let Err(err) = result {
                            self.diagnostics.report(&self.id.to_string(), &err);
                        }
                    }
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(cooldown) => {}
                }
            }
            debug!(source = %self.id, "refresh loop cancelled");
        })
    }
}
