#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// Name, help text and label schema of one exported metric.
///
/// `labels` is the ordered schema every observation fills in. `const_labels`
/// distinguish several descriptors sharing one metric name, like the
/// `state="failed"` and `state="success"` request counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
    pub const_labels: &'static [(&'static str, &'static str)],
    pub kind: MetricKind,
}

impl MetricDescriptor {
    pub const fn gauge(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            labels,
            const_labels: &[],
            kind: MetricKind::Gauge,
        }
    }

    pub const fn counter(name: &'static str, help: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            help,
            labels,
            const_labels: &[],
            kind: MetricKind::Counter,
        }
    }

    pub const fn with_const_labels(mut self, const_labels: &'static [(&'static str, &'static str)]) -> Self {
        self.const_labels = const_labels;
        self
    }
}

pub const DIRECTORY_LABELS: &[&str] = &["address", "protocol"];

pub const SERVER_LABELS: &[&str] = &[
    "name",
    "address",
    "gametype",
    "max_players",
    "password",
    "map",
    "version",
    "master_server_protocol",
    "master_server_address",
];

pub const LIVE_LABELS: &[&str] = &["address", "port"];

pub const LIVE_EVENT_LABELS: &[&str] = &["address", "port", "event"];

pub const MASTER_SERVER_PLAYERS: MetricDescriptor = MetricDescriptor::gauge(
    "teeworlds_master_server_players",
    "Number of players on all servers listed by the master server",
    DIRECTORY_LABELS,
);

pub const MASTER_SERVER_SERVERS: MetricDescriptor = MetricDescriptor::gauge(
    "teeworlds_master_server_servers",
    "Number of servers listed by the master server",
    DIRECTORY_LABELS,
);

pub const MASTER_SERVER_REQUEST_DURATION: MetricDescriptor = MetricDescriptor::gauge(
    "teeworlds_master_server_request_duration_seconds",
    "Duration of the last successful master server request",
    DIRECTORY_LABELS,
);

const MASTER_SERVER_REQUEST_TOTAL: MetricDescriptor = MetricDescriptor::counter(
    "teeworlds_master_server_request_total",
    "Number of master server requests",
    DIRECTORY_LABELS,
);

pub const MASTER_SERVER_REQUEST_FAILED: MetricDescriptor =
    MASTER_SERVER_REQUEST_TOTAL.with_const_labels(&[("state", "failed")]);

pub const MASTER_SERVER_REQUEST_SUCCESS: MetricDescriptor =
    MASTER_SERVER_REQUEST_TOTAL.with_const_labels(&[("state", "success")]);

pub const SERVER_PLAYERS: MetricDescriptor = MetricDescriptor::gauge(
    "teeworlds_server_players",
    "Number of players on the game server",
    SERVER_LABELS,
);

pub const ECON_EVENT_TOTAL: MetricDescriptor = MetricDescriptor::counter(
    "teeworlds_econ_event_total",
    "Number of econ events seen per category",
    LIVE_EVENT_LABELS,
);

pub const ECON_UP: MetricDescriptor = MetricDescriptor::gauge(
    "teeworlds_econ_up",
    "Whether the econ connection is established",
    LIVE_LABELS,
);
