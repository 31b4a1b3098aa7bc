use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    hash::Hash,
    pin::Pin,
    sync::Arc,
};
use tokio::sync::oneshot;
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("The source {source_id} cannot be registered: {reason}")]
    InvalidSource { source_id: String, reason: String },
}

/// A remote source the registry can own and drive.
///
/// `run` is the source's whole lifetime: it is spawned once by
/// [`Registry::start_all`] and must return soon after `cancel` fires.
pub trait Source: Send + Sync + 'static {
    type Id: Clone + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// Per registration scheduling parameters, e.g. the poll cooldown.
    type Schedule: Clone + fmt::Debug + Send + Sync + 'static;
    type Snapshot: Clone + Send + 'static;

    fn id(&self) -> Self::Id;

    fn check_schedule(&self, _schedule: &Self::Schedule) -> Result<(), RegistryError> {
        Ok(())
    }

    /// Copy of the current state, taken under the source's own lock.
    fn snapshot(&self) -> Self::Snapshot;

    fn run(
        self: Arc<Self>,
        schedule: Self::Schedule,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
}

struct Entry<S: Source> {
    source: Arc<S>,
    schedule: S::Schedule,
    /// Present while a loop runs for this entry, dropping it cancels the loop.
    task: Option<DropGuard>,
}

/// Owns all sources of one kind, keyed by their identity.
///
/// The map lock is only held to insert, remove or clone handles. Each source
/// protects its state with its own lock, so a slow source never blocks
/// snapshots of the others.
pub struct Registry<S: Source> {
    entries: Arc<Mutex<BTreeMap<S::Id, Entry<S>>>>,
}

impl<S: Source> Clone for Registry<S> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S: Source> Default for Registry<S> {
    fn default() -> Self {
        Self {
            entries: Default::default(),
        }
    }
}

impl<S: Source> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_map()
            .entries(entries.iter().map(|(id, entry)| (id, entry.task.is_some())))
            .finish()
    }
}

impl<S: Source> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the source, replacing any entry with the same identity.
    ///
    /// A replaced entry's loop is cancelled, the new entry starts idle until
    /// the next [`Registry::start_all`].
    pub fn register(&self, source: Arc<S>, schedule: S::Schedule) -> Result<(), RegistryError> {
        source.check_schedule(&schedule)?;

        let id = source.id();
        let replaced = self.entries.lock().insert(
            id.clone(),
            Entry {
                source,
                schedule,
                task: None,
            },
        );

        match replaced {
            Some(entry) if entry.task.is_some() => info!(source = %id, "replaced running source, loop cancelled"),
            Some(_) => debug!(source = %id, "replaced idle source"),
            None => debug!(source = %id, "registered source"),
        }
        Ok(())
    }

    /// Removes the source and cancels its loop if one runs.
    pub fn delete(&self, id: &S::Id) -> Option<Arc<S>> {
        let entry = self.entries.lock().remove(id)?;
        if entry.task.is_some() {
            debug!(source = %id, "deleted source, loop cancelled");
        }
        Some(entry.source)
    }

    /// Spawns a loop for every entry that has none yet.
    ///
    /// Returns once each new loop confirmed that it started, which happens
    /// before its first network operation. Returns the number of loops
    /// started, calling it again without new registrations starts nothing.
    pub async fn start_all(&self) -> usize {
        let pending = {
            let mut entries = self.entries.lock();
            entries
                .iter_mut()
                .filter(|(_, entry)| entry.task.is_none())
                .map(|(id, entry)| {
                    let cancel = CancellationToken::new();
                    let (started_tx, started_rx) = oneshot::channel();

                    tokio::task::spawn({
                        let id = id.clone();
                        let source = entry.source.clone();
                        let schedule = entry.schedule.clone();
                        let cancel = cancel.clone();
                        async move {
                            let _ = started_tx.send(());
                            source.run(schedule, cancel).await;
                            debug!(source = %id, "source loop stopped");
                        }
                    });

                    entry.task = Some(cancel.drop_guard());
                    (id.clone(), started_rx)
                })
                .collect::<Vec<_>>()
        };

        let started = pending.len();
        for (id, started_rx) in pending {
            if started_rx.await.is_err() {
                warn!(source = %id, "source loop ended before it started");
            }
        }

        if started > 0 {
            info!(started, "started source loops");
        }
        started
    }

    /// Cancels every running loop. The entries stay registered and can be
    /// started again.
    pub fn shutdown(&self) {
        let guards = self
            .entries
            .lock()
            .values_mut()
            .filter_map(|entry| entry.task.take())
            .collect::<Vec<_>>();
        debug!(stopped = guards.len(), "stopping source loops");
        drop(guards);
    }

    /// Point in time copy of every source's state, ordered by identity.
    pub fn snapshot(&self) -> Vec<S::Snapshot> {
        self.sources().iter().map(|source| source.snapshot()).collect()
    }

    pub fn sources(&self) -> Vec<Arc<S>> {
        self.entries.lock().values().map(|entry| entry.source.clone()).collect()
    }

    pub fn contains(&self, id: &S::Id) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn is_running(&self, id: &S::Id) -> bool {
        self.entries.lock().get(id).is_some_and(|entry| entry.task.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
