use std::{
    error::Error,
    fmt,
    sync::Arc,
};

/// Receives failures that must not interrupt a source loop, like a master
/// server that timed out or an econ connection the game server closed.
///
/// Reporting is best effort, implementations must not block.
pub trait Diagnostics: fmt::Debug + Send + Sync + 'static {
    fn report(&self, source: &str, error: &(dyn Error + 'static));
}

pub type SharedDiagnostics = Arc<dyn Diagnostics>;

/// Forwards every report to `tracing` at warn level. The error is recorded as
/// a field so subscribers render its source chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl TracingDiagnostics {
    pub fn shared() -> SharedDiagnostics {
        Arc::new(Self)
    }
}

impl Diagnostics for TracingDiagnostics {
    fn report(&self, source: &str, error: &(dyn Error + 'static)) {
        warn!(source, error, "source failed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Keeps every report so tests can assert on them.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingDiagnostics {
        reports: Mutex<Vec<(String, String)>>,
    }

    impl RecordingDiagnostics {
        pub(crate) fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn reports(&self) -> Vec<(String, String)> {
            self.reports.lock().clone()
        }
    }

    impl Diagnostics for RecordingDiagnostics {
        fn report(&self, source: &str, error: &(dyn Error + 'static)) {
            self.reports.lock().push((source.to_string(), error.to_string()));
        }
    }
}
