use clap::Parser;
use std::{
    net::{
        IpAddr,
        Ipv4Addr,
        SocketAddr,
    },
    path::PathBuf,
    time::Duration,
};

/// Prometheus exporter for Teeworlds master servers and econ consoles.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAML file listing the master servers and econ consoles.
    #[arg(long, env = "TEEWORLDS_EXPORTER_CONFIG_PATH", default_value = "./config.yml")]
    pub config_path: PathBuf,

    /// Port the HTTP server listens on.
    #[arg(long, env = "TEEWORLDS_EXPORTER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path the metrics are served at.
    #[arg(long, env = "TEEWORLDS_EXPORTER_ENDPOINT", default_value = "/metrics")]
    pub endpoint: String,

    /// Upper bound for a single master server poll and for connecting to an
    /// econ console (e.g. "10s", "1m 30s").
    #[arg(long, env = "TEEWORLDS_EXPORTER_POLL_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    pub poll_timeout: Duration,

    /// Enable debug logging. `RUST_LOG` takes precedence when set.
    #[arg(short, long, env = "TEEWORLDS_EXPORTER_DEBUG")]
    pub verbose: bool,
}

impl Args {
    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
    }
}
