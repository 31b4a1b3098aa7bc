//! The exporter's configuration document: which master servers to poll and
//! which econ consoles to listen to.

#[macro_use]
extern crate tracing;

use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashSet,
    fmt,
    path::Path,
    time::Duration,
};
use url::Url;

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

/// Prefix of environment variables overriding values of the file, e.g.
/// `TEEWORLDS_EXPORTER__SERVERS__MASTER`.
pub const ENV_PREFIX: &str = "TEEWORLDS_EXPORTER";

pub const DEFAULT_REFRESH_COOLDOWN: u64 = 10;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{server}: refresh_cooldown must be greater than zero")]
    ZeroCooldown { server: String },
    #[error("{server}: {field} must not be empty")]
    Empty { server: String, field: &'static str },
    #[error("{server}: port must not be zero")]
    ZeroPort { server: String },
    #[error("{server}: unsupported URL scheme {scheme:?}")]
    UnsupportedScheme { server: String, scheme: String },
    #[error("{server} is configured more than once")]
    Duplicate { server: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub servers: Servers,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Servers {
    #[serde(default)]
    pub econ: Vec<EconServer>,
    #[serde(default)]
    pub master: Vec<MasterServer>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconServer {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl EconServer {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for EconServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EconServer")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterServer {
    #[serde(flatten)]
    pub endpoint: MasterEndpoint,
    /// Seconds between the end of one poll and the start of the next.
    #[serde(default = "default_refresh_cooldown")]
    pub refresh_cooldown: u64,
}

fn default_refresh_cooldown() -> u64 {
    DEFAULT_REFRESH_COOLDOWN
}

impl MasterServer {
    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.refresh_cooldown)
    }
}

/// Where a master server is reached, selected by the `protocol` key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum MasterEndpoint {
    Http { url: Url },
    Udp { host: String, port: u16 },
}

impl fmt::Display for MasterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterEndpoint::Http { url } => write!(f, "http master {url}"),
            MasterEndpoint::Udp { host, port } => write!(f, "udp master {host}:{port}"),
        }
    }
}

impl Config {
    /// Layers the built-in defaults, the YAML file at `path` and
    /// `TEEWORLDS_EXPORTER__*` environment variables, then validates the
    /// result.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(?path, "loading configuration");
        let builder = Self::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml).required(true))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            );
        Self::build(builder)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let builder = Self::builder().add_source(config::File::from_str(content, config::FileFormat::Yaml));
        Self::build(builder)
    }

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder().add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml))
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self, ConfigError> {
        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations the exporter cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut masters = HashSet::new();
        for master in &self.servers.master {
            let server = master.endpoint.to_string();
            if master.refresh_cooldown == 0 {
                return Err(ConfigError::ZeroCooldown { server });
            }
            match &master.endpoint {
                MasterEndpoint::Http { url } if !matches!(url.scheme(), "http" | "https") => {
                    return Err(ConfigError::UnsupportedScheme {
                        scheme: url.scheme().to_string(),
                        server,
                    });
                }
                MasterEndpoint::Udp { host, .. } if host.trim().is_empty() => {
                    return Err(ConfigError::Empty { server, field: "host" });
                }
                MasterEndpoint::Udp { port: 0, .. } => return Err(ConfigError::ZeroPort { server }),
                _ => {}
            }
            if !masters.insert(master.endpoint.clone()) {
                return Err(ConfigError::Duplicate { server });
            }
        }

        let mut consoles = HashSet::new();
        for econ in &self.servers.econ {
            let server = format!("econ {}", econ.address());
            if econ.host.trim().is_empty() {
                return Err(ConfigError::Empty { server, field: "host" });
            }
            if econ.port == 0 {
                return Err(ConfigError::ZeroPort { server });
            }
            if !consoles.insert((econ.host.as_str(), econ.port)) {
                return Err(ConfigError::Duplicate { server });
            }
        }

        if self.servers.master.is_empty() && self.servers.econ.is_empty() {
            warn!("no master server and no econ console configured, only empty scrapes will be served");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}
