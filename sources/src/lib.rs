//! # Teeworlds Exporter Sources
//!
//! Everything that talks to the outside world and keeps the latest known state
//! around for the exporter to read.
//!
//! ## Architecture
//!
//! - **`registry`**: [`Registry`] owns the sources of one kind, runs one
//!   cancellable loop per source and hands out point-in-time snapshots.
//! - **`directory`**: master servers (HTTP JSON and UDP browser protocol)
//!   polled at a fixed cooldown.
//! - **`live`**: econ (external console) connections whose log lines are
//!   counted per event category.
//! - **`diagnostics`**: the sink non-fatal failures are reported to.
//! - **`server`**: the game server records shared by both directory protocols.

#[macro_use]
extern crate tracing;

pub mod diagnostics;
pub mod directory;
pub mod live;
pub mod registry;
pub mod server;

pub use diagnostics::{
    Diagnostics,
    SharedDiagnostics,
    TracingDiagnostics,
};
pub use directory::{
    DirectoryId,
    DirectoryMetrics,
    DirectoryProtocol,
    DirectorySnapshot,
    DirectorySource,
    FetchError,
    Protocol,
};
pub use live::{
    EconConnection,
    EconError,
    EconId,
    EventKind,
    EventStream,
    LiveSnapshot,
    LiveSource,
};
pub use registry::{
    Registry,
    RegistryError,
    Source,
};
pub use server::{
    Client,
    GameServer,
    ServerInfo,
    ServerList,
    ServerMap,
};

/// Registry of all polled master servers.
pub type DirectoryRegistry = Registry<DirectorySource>;

/// Registry of all econ connections.
pub type LiveRegistry = Registry<LiveSource>;
