//! # Live Sources
//!
//! A live source is one econ (external console) connection. Every console line
//! is dispatched to the handlers subscribed at construction, each handler
//! counting one [`EventKind`].

mod econ;
mod events;

use crate::{
    diagnostics::SharedDiagnostics,
    registry::Source,
};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

pub use self::{
    econ::{
        EconConnection,
        EconError,
        EventStream,
    },
    events::{
        EventDispatcher,
        EventKind,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EconId {
    pub host: String,
    pub port: u16,
}

impl EconId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for EconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "econ {}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSnapshot {
    pub id: EconId,
    pub connected: bool,
    /// One counter per subscribed event kind, zero until the first match.
    pub events: BTreeMap<EventKind, u64>,
}

#[derive(Debug, Default)]
struct LiveState {
    counters: BTreeMap<EventKind, u64>,
    connected: bool,
}

/// An econ connection and the event counters accumulated from it.
///
/// The stream is consumed by the first loop started for this source. Counters
/// outlive the connection.
pub struct LiveSource {
    id: EconId,
    dispatcher: EventDispatcher,
    state: Arc<Mutex<LiveState>>,
    stream: Mutex<Option<Box<dyn EventStream>>>,
    diagnostics: SharedDiagnostics,
}

impl fmt::Debug for LiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSource")
            .field("id", &self.id)
            .field("dispatcher", &self.dispatcher)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl LiveSource {
    /// Counts every known event kind.
    pub fn new(id: EconId, stream: impl EventStream, diagnostics: SharedDiagnostics) -> Result<Self, EconError> {
        Self::with_events(id, stream, EventKind::all(), diagnostics)
    }

    pub fn with_events(
        id: EconId,
        stream: impl EventStream,
        kinds: impl IntoIterator<Item = EventKind>,
        diagnostics: SharedDiagnostics,
    ) -> Result<Self, EconError> {
        let state = Arc::new(Mutex::new(LiveState::default()));
        let mut dispatcher = EventDispatcher::new();

        for kind in kinds {
            state.lock().counters.insert(kind, 0);
            let counters = state.clone();
            dispatcher.subscribe(kind.pattern(), move |_| {
                *counters.lock().counters.entry(kind).or_default() += 1;
            })?;
        }

        Ok(Self {
            id,
            dispatcher,
            state,
            stream: Mutex::new(Some(Box::new(stream))),
            diagnostics,
        })
    }

    pub fn metadata(&self) -> &EconId {
        &self.id
    }

    /// Feeds one console line to the subscribed handlers.
    pub fn dispatch(&self, line: &str) -> usize {
        self.dispatcher.dispatch(line)
    }

    pub fn counters(&self) -> BTreeMap<EventKind, u64> {
        self.state.lock().counters.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }
}

impl Source for LiveSource {
    type Id = EconId;
    /// Console lines are pushed by the server, there is nothing to schedule.
    type Schedule = ();
    type Snapshot = LiveSnapshot;

    fn id(&self) -> EconId {
        self.id.clone()
    }

    fn snapshot(&self) -> LiveSnapshot {
        let state = self.state.lock();
        LiveSnapshot {
            id: self.id.clone(),
            connected: state.connected,
            events: state.counters.clone(),
        }
    }

    fn run(self: Arc<Self>, _schedule: (), cancel: CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        Box::pin(async move {
            let Some(mut stream) = self.stream.lock().take() else {
                warn!(source = %self.id, "econ stream already consumed, not listening");
                return;
            };

            self.set_connected(true);
            debug!(source = %self.id, "listening for console events");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(source = %self.id, "event loop cancelled");
                        break;
                    }
                    next = stream.next_event() => match next {
                        Ok(Some(line)) => {
                            let matched = self.dispatch(&line);
                            trace!(source = %self.id, matched, %line, "console line");
                        }
                        Ok(None) => {
                            self.diagnostics.report(&self.id.to_string(), &EconError::ConnectionClosed);
                            break;
                        }
                        Err(err) => {
                            self.diagnostics.report(&self.id.to_string(), &err);
                            break;
                        }
                    }
                }
            }
            self.set_connected(false);
        })
    }
}
