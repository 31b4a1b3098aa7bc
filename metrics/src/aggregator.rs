use crate::{
    descriptor::{
        self,
        MetricDescriptor,
    },
    encode::{
        encode_text,
        EncodeError,
    },
};
use teeworlds_exporter_sources::{
    DirectorySnapshot,
    EventKind,
    GameServer,
    LiveSnapshot,
};

/// One sample: a descriptor, the values of its label schema and the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub descriptor: MetricDescriptor,
    pub labels: Vec<String>,
    pub value: f64,
}

/// How a metric pulls its value out of the snapshots. The level decides which
/// labels the observation carries.
#[derive(Clone, Copy)]
pub enum Extractor {
    /// One observation per master server, `None` skips it.
    Directory(fn(&DirectorySnapshot) -> Option<f64>),
    /// One observation per listed game server that has an address.
    Server(fn(&GameServer) -> f64),
    /// One observation per econ connection.
    Live(fn(&LiveSnapshot) -> f64),
    /// One observation per econ connection and counted event kind.
    LiveEvent(fn(EventKind, u64) -> f64),
}

#[derive(Clone, Copy)]
pub struct MetricDefinition {
    pub descriptor: MetricDescriptor,
    pub extractor: Extractor,
}

impl MetricDefinition {
    pub const fn new(descriptor: MetricDescriptor, extractor: Extractor) -> Self {
        Self { descriptor, extractor }
    }
}

/// Turns source snapshots into observations, in the order of its
/// definitions.
pub struct Aggregator {
    definitions: Vec<MetricDefinition>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.definitions.iter().map(|definition| definition.descriptor.name))
            .finish()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(vec![
            MetricDefinition::new(
                descriptor::MASTER_SERVER_PLAYERS,
                Extractor::Directory(|snapshot| Some(snapshot.player_count() as f64)),
            ),
            MetricDefinition::new(
                descriptor::MASTER_SERVER_SERVERS,
                Extractor::Directory(|snapshot| Some(snapshot.servers.len() as f64)),
            ),
            MetricDefinition::new(
                descriptor::MASTER_SERVER_REQUEST_DURATION,
                Extractor::Directory(|snapshot| snapshot.metrics.request_duration.map(|elapsed| elapsed.as_secs_f64())),
            ),
            MetricDefinition::new(
                descriptor::MASTER_SERVER_REQUEST_FAILED,
                Extractor::Directory(|snapshot| Some(snapshot.metrics.failure_count as f64)),
            ),
            MetricDefinition::new(
                descriptor::MASTER_SERVER_REQUEST_SUCCESS,
                Extractor::Directory(|snapshot| Some(snapshot.metrics.success_count as f64)),
            ),
            MetricDefinition::new(
                descriptor::SERVER_PLAYERS,
                Extractor::Server(|server| server.player_count() as f64),
            ),
            MetricDefinition::new(
                descriptor::ECON_EVENT_TOTAL,
                Extractor::LiveEvent(|_, count| count as f64),
            ),
            MetricDefinition::new(
                descriptor::ECON_UP,
                Extractor::Live(|snapshot| if snapshot.connected { 1.0 } else { 0.0 }),
            ),
        ])
    }
}

impl Aggregator {
    pub fn new(definitions: Vec<MetricDefinition>) -> Self {
        Self { definitions }
    }

    pub fn descriptors(&self) -> Vec<MetricDescriptor> {
        self.definitions.iter().map(|definition| definition.descriptor).collect()
    }

    /// Labels and values only come from the snapshots, so a collection never
    /// waits on a source.
    pub fn collect(&self, directories: &[DirectorySnapshot], lives: &[LiveSnapshot]) -> Vec<Observation> {
        let mut observations = Vec::new();
        for definition in &self.definitions {
            let descriptor = definition.descriptor;
            let mut observe = |labels: Vec<String>, value: f64| {
                observations.push(Observation {
                    descriptor,
                    labels,
                    value,
                })
            };

            match definition.extractor {
                Extractor::Directory(extract) => {
                    for snapshot in directories {
                        if let Some(value) = extract(snapshot) {
                            observe(directory_labels(snapshot), value);
                        }
                    }
                }
                Extractor::Server(extract) => {
                    for snapshot in directories {
                        for server in snapshot.servers.iter() {
                            match server_labels(snapshot, server) {
                                Some(labels) => observe(labels, extract(server)),
                                None => trace!(directory = %snapshot.id, name = %server.info.name, "skipping server without address"),
                            }
                        }
                    }
                }
                Extractor::Live(extract) => {
                    for snapshot in lives {
                        observe(live_labels(snapshot), extract(snapshot));
                    }
                }
                Extractor::LiveEvent(extract) => {
                    for snapshot in lives {
                        for (kind, count) in &snapshot.events {
                            let mut labels = live_labels(snapshot);
                            labels.push(kind.to_string());
                            observe(labels, extract(*kind, *count));
                        }
                    }
                }
            }
        }
        observations
    }

    /// Collects and renders one scrape.
    pub fn render(&self, directories: &[DirectorySnapshot], lives: &[LiveSnapshot]) -> Result<String, EncodeError> {
        encode_text(&self.descriptors(), &self.collect(directories, lives))
    }
}

fn directory_labels(snapshot: &DirectorySnapshot) -> Vec<String> {
    vec![snapshot.id.address.clone(), snapshot.id.protocol.to_string()]
}

fn server_labels(snapshot: &DirectorySnapshot, server: &GameServer) -> Option<Vec<String>> {
    let address = server.first_address()?;
    let info = &server.info;
    Some(vec![
        info.name.clone(),
        address.to_string(),
        info.game_type.clone(),
        info.max_players.to_string(),
        info.passworded.to_string(),
        info.map.name.clone(),
        info.version.clone(),
        snapshot.id.protocol.to_string(),
        snapshot.id.address.clone(),
    ])
}

fn live_labels(snapshot: &LiveSnapshot) -> Vec<String> {
    vec![snapshot.id.host.clone(), snapshot.id.port.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{
        collections::BTreeMap,
        sync::Arc,
        time::Duration,
    };
    use teeworlds_exporter_sources::{
        Client,
        DirectoryId,
        DirectoryMetrics,
        EconId,
        Protocol,
        ServerInfo,
        ServerMap,
    };

    fn server(name: &str, addresses: &[&str], clients: usize, passworded: bool) -> GameServer {
        GameServer {
            addresses: addresses.iter().map(|address| address.to_string()).collect(),
            location: None,
            info: ServerInfo {
                max_players: 16,
                passworded,
                game_type: "CTF".to_string(),
                name: name.to_string(),
                map: ServerMap {
                    name: "ctf5".to_string(),
                    ..Default::default()
                },
                version: "0.6.4".to_string(),
                clients: vec![Client::default(); clients],
                ..Default::default()
            },
        }
    }

    fn directory() -> DirectorySnapshot {
        DirectorySnapshot {
            id: DirectoryId::new(Protocol::Udp, "master1.teeworlds.com:8283"),
            servers: Arc::new(vec![
                server("alpha", &["192.0.2.1:8303"], 3, false),
                server("ghost", &[], 5, false),
                server("bravo", &["192.0.2.2:8303", "192.0.2.2:8304"], 1, true),
            ]),
            metrics: DirectoryMetrics {
                success_count: 4,
                failure_count: 1,
                request_duration: Some(Duration::from_millis(250)),
            },
        }
    }

    fn live() -> LiveSnapshot {
        LiveSnapshot {
            id: EconId::new("10.0.0.5", 8303),
            connected: true,
            events: BTreeMap::from([(EventKind::Message, 2), (EventKind::Kill, 1)]),
        }
    }

    fn values(observations: &[Observation], name: &str) -> Vec<(Vec<String>, f64)> {
        observations
            .iter()
            .filter(|observation| observation.descriptor.name == name)
            .map(|observation| (observation.labels.clone(), observation.value))
            .collect()
    }

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn directory_level_metrics() {
        let observations = Aggregator::default().collect(&[directory()], &[]);
        let directory_labels = labels(&["master1.teeworlds.com:8283", "udp"]);

        assert_eq!(
            values(&observations, "teeworlds_master_server_players"),
            vec![(directory_labels.clone(), 9.0)]
        );
        assert_eq!(
            values(&observations, "teeworlds_master_server_servers"),
            vec![(directory_labels.clone(), 3.0)]
        );
        assert_eq!(
            values(&observations, "teeworlds_master_server_request_duration_seconds"),
            vec![(directory_labels.clone(), 0.25)]
        );
        assert_eq!(
            values(&observations, "teeworlds_master_server_request_total"),
            vec![(directory_labels.clone(), 1.0), (directory_labels, 4.0)]
        );
    }

    #[test]
    fn duration_is_skipped_before_the_first_success() {
        let mut snapshot = directory();
        snapshot.metrics = DirectoryMetrics::default();

        let observations = Aggregator::default().collect(&[snapshot], &[]);
        assert!(values(&observations, "teeworlds_master_server_request_duration_seconds").is_empty());
        assert_eq!(values(&observations, "teeworlds_master_server_request_total").len(), 2);
    }

    #[test]
    fn servers_without_address_are_skipped() {
        let observations = Aggregator::default().collect(&[directory()], &[]);

        assert_eq!(
            values(&observations, "teeworlds_server_players"),
            vec![
                (
                    labels(&[
                        "alpha",
                        "192.0.2.1:8303",
                        "CTF",
                        "16",
                        "false",
                        "ctf5",
                        "0.6.4",
                        "udp",
                        "master1.teeworlds.com:8283"
                    ]),
                    3.0
                ),
                (
                    labels(&[
                        "bravo",
                        "192.0.2.2:8303",
                        "CTF",
                        "16",
                        "true",
                        "ctf5",
                        "0.6.4",
                        "udp",
                        "master1.teeworlds.com:8283"
                    ]),
                    1.0
                ),
            ]
        );
    }

    #[test]
    fn live_level_metrics() {
        let observations = Aggregator::default().collect(&[], &[live()]);

        assert_eq!(
            values(&observations, "teeworlds_econ_event_total"),
            vec![
                (labels(&["10.0.0.5", "8303", "message"]), 2.0),
                (labels(&["10.0.0.5", "8303", "kill"]), 1.0),
            ]
        );
        assert_eq!(
            values(&observations, "teeworlds_econ_up"),
            vec![(labels(&["10.0.0.5", "8303"]), 1.0)]
        );
    }

    #[test]
    fn observations_follow_definition_order() {
        let observations = Aggregator::default().collect(&[directory()], &[live()]);
        let mut names = observations
            .iter()
            .map(|observation| observation.descriptor.name)
            .collect::<Vec<_>>();
        names.dedup();

        assert_eq!(
            names,
            vec![
                "teeworlds_master_server_players",
                "teeworlds_master_server_servers",
                "teeworlds_master_server_request_duration_seconds",
                "teeworlds_master_server_request_total",
                "teeworlds_server_players",
                "teeworlds_econ_event_total",
                "teeworlds_econ_up",
            ]
        );
    }

    #[test]
    fn renders_a_full_scrape() {
        let text = Aggregator::default().render(&[directory()], &[live()]).unwrap();

        for line in [
            r#"teeworlds_master_server_players{address="master1.teeworlds.com:8283",protocol="udp"} 9"#,
            r#"teeworlds_master_server_request_total{address="master1.teeworlds.com:8283",protocol="udp",state="failed"} 1"#,
            r#"teeworlds_master_server_request_total{address="master1.teeworlds.com:8283",protocol="udp",state="success"} 4"#,
            r#"teeworlds_econ_event_total{address="10.0.0.5",event="kill",port="8303"} 1"#,
            r#"teeworlds_econ_up{address="10.0.0.5",port="8303"} 1"#,
        ] {
            assert!(text.lines().any(|rendered| rendered == line), "missing {line} in\n{text}");
        }
        assert!(!text.contains("ghost"));
    }

    #[test]
    fn empty_scrape_renders_nothing() {
        assert_eq!(Aggregator::default().render(&[], &[]).unwrap(), "");
    }
}
