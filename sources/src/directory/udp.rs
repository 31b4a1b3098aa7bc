use super::{
    packet,
    DirectoryId,
    DirectoryProtocol,
    FetchError,
    Protocol,
};
use crate::server::GameServer;
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::atomic::{
        AtomicU8,
        Ordering,
    },
    time::Duration,
};
use tokio::{
    net::UdpSocket,
    time::Instant,
};

/// Largest datagram a Teeworlds peer sends.
const MAX_PACKET_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpSettings {
    /// The address list is complete once the master stayed quiet this long.
    pub list_idle_timeout: Duration,
    /// How long game servers get to answer the info requests of one poll.
    pub info_timeout: Duration,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            list_idle_timeout: Duration::from_secs(1),
            info_timeout: Duration::from_secs(3),
        }
    }
}

/// Session with a Teeworlds 0.6 master server.
///
/// The socket is bound and the master address resolved once, when the session
/// is opened. Polls of one source never overlap, stale datagrams from a
/// previous poll are told apart by the request token.
#[derive(Debug)]
pub struct UdpDirectory {
    host: String,
    port: u16,
    master: SocketAddr,
    socket: UdpSocket,
    settings: UdpSettings,
    token: AtomicU8,
}

impl UdpDirectory {
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Self, FetchError> {
        Self::connect_with(host, port, UdpSettings::default()).await
    }

    pub async fn connect_with(host: impl Into<String>, port: u16, settings: UdpSettings) -> Result<Self, FetchError> {
        let host = host.into();
        let master = tokio::net::lookup_host((host.as_str(), port))
            .await?
            .next()
            .ok_or_else(|| FetchError::Resolve(format!("{host}:{port}")))?;

        let bind_address: SocketAddr = if master.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_address).await?;
        debug!(%master, local = ?socket.local_addr().ok(), "opened master server session");

        Ok(Self {
            host,
            port,
            master,
            socket,
            settings,
            token: AtomicU8::new(0),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Addresses of every game server registered on the master.
    pub async fn list_addresses(&self) -> Result<Vec<SocketAddr>, FetchError> {
        self.socket.send_to(&packet::list_request(), self.master).await?;

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut addresses = Vec::new();
        let mut answered = false;

        loop {
            let (size, from) =
                match tokio::time::timeout(self.settings.list_idle_timeout, self.socket.recv_from(&mut buffer)).await {
                    Ok(received) => received?,
                    Err(_) => break,
                };
            if from != self.master || !packet::is_list_response(&buffer[..size]) {
                trace!(%from, size, "ignoring datagram while listing");
                continue;
            }

            answered = true;
            match packet::parse_list_response(&buffer[..size]) {
                Ok(page) => addresses.extend(page),
                Err(err) => debug!(master = %self.master, "skipping list packet: {err}"),
            }
        }

        if !answered {
            return Err(FetchError::NoResponse(self.settings.list_idle_timeout));
        }

        let mut seen = HashSet::new();
        addresses.retain(|address| seen.insert(*address));
        Ok(addresses)
    }

    /// Asks every address for its info. Servers that do not answer in time are
    /// left out, the result keeps the order of `addresses`.
    pub async fn query_info(&self, addresses: &[SocketAddr]) -> Vec<GameServer> {
        let token = self.token.fetch_add(1, Ordering::Relaxed);
        let request = packet::info_request(token);

        let mut pending = 0usize;
        let mut answers: HashMap<SocketAddr, Option<GameServer>> = HashMap::with_capacity(addresses.len());
        for address in addresses {
            match self.socket.send_to(&request, address).await {
                Ok(_) => {
                    answers.insert(*address, None);
                    pending += 1;
                }
                Err(err) => trace!(%address, "could not send info request: {err}"),
            }
        }

        let deadline = Instant::now() + self.settings.info_timeout;
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        while pending > 0 {
            let (size, from) = match tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buffer)).await {
                Ok(Ok(received)) => received,
                Ok(Err(err)) => {
                    debug!("receiving info failed: {err}");
                    continue;
                }
                Err(_) => break,
            };

            let Some(slot) = answers.get_mut(&from) else {
                continue;
            };
            if slot.is_some() {
                continue;
            }
            match packet::parse_info_response_for(&buffer[..size], token) {
                Ok(info) => {
                    *slot = Some(info.into_game_server(from));
                    pending -= 1;
                }
                Err(err) => trace!(%from, "ignoring info answer: {err}"),
            }
        }

        if pending > 0 {
            debug!(master = %self.address(), missing = pending, "some game servers did not answer");
        }

        addresses
            .iter()
            .filter_map(|address| answers.get_mut(address).and_then(Option::take))
            .collect()
    }

    async fn fetch_servers(&self) -> Result<Vec<GameServer>, FetchError> {
        let addresses = self.list_addresses().await?;
        Ok(self.query_info(&addresses).await)
    }
}

impl DirectoryProtocol for UdpDirectory {
    fn id(&self) -> DirectoryId {
        DirectoryId::new(Protocol::Udp, self.address())
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Vec<GameServer>, FetchError>> + Send + '_>> {
        Box::pin(self.fetch_servers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::packet::parse_info_response;
    use pretty_assertions::assert_eq;

    fn fast() -> UdpSettings {
        UdpSettings {
            list_idle_timeout: Duration::from_millis(200),
            info_timeout: Duration::from_millis(300),
        }
    }

    /// Game server answering every info request with its configured flags.
    async fn spawn_game_server(name: &'static str, flags: &'static str) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];
            while let Ok((size, from)) = socket.recv_from(&mut buffer).await {
                if size != 15 || buffer[6..14] != packet::GET_INFO {
                    continue;
                }
                let token = buffer[14].to_string();
                let answer = packet::info_response(&[
                    &token, "0.6.4", name, "ctf2", "CTF", flags, "1", "8", "1", "8", "nameless tee", "", "-1", "3", "1",
                ]);
                socket.send_to(&answer, from).await.unwrap();
            }
        });
        address
    }

    /// Master listing `servers`, split over two packets.
    async fn spawn_master(servers: Vec<SocketAddr>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];
            while let Ok((size, from)) = socket.recv_from(&mut buffer).await {
                if buffer[..size] != packet::list_request()[..] {
                    continue;
                }
                let (first, second) = servers.split_at(servers.len() / 2);
                socket.send_to(&packet::list_response(first), from).await.unwrap();
                socket.send_to(&packet::list_response(second), from).await.unwrap();
            }
        });
        address
    }

    async fn silent_address() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = socket.local_addr().unwrap();
        // keep the port bound but never answer
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];
            while socket.recv_from(&mut buffer).await.is_ok() {}
        });
        address
    }

    #[tokio::test]
    async fn poll_lists_and_queries_servers() {
        let open = spawn_game_server("open", "0").await;
        let locked = spawn_game_server("locked", "1").await;
        let master = spawn_master(vec![open, locked]).await;

        let directory = UdpDirectory::connect_with("127.0.0.1", master.port(), fast())
            .await
            .unwrap();
        assert_eq!(
            directory.id(),
            DirectoryId::new(Protocol::Udp, format!("127.0.0.1:{}", master.port()))
        );

        let servers = directory.fetch().await.unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].info.name, "open");
        assert!(!servers[0].info.passworded);
        assert_eq!(servers[0].addresses, vec![open.to_string()]);
        assert_eq!(servers[1].info.name, "locked");
        assert!(servers[1].info.passworded);
        assert_eq!(servers[1].player_count(), 1);
    }

    #[tokio::test]
    async fn silent_game_servers_are_left_out() {
        let open = spawn_game_server("open", "0").await;
        let silent = silent_address().await;
        let master = spawn_master(vec![silent, open]).await;

        let directory = UdpDirectory::connect_with("127.0.0.1", master.port(), fast())
            .await
            .unwrap();
        let servers = directory.fetch().await.unwrap();

        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].info.name, "open");
    }

    #[tokio::test]
    async fn silent_master_fails_the_poll() {
        let master = silent_address().await;
        let directory = UdpDirectory::connect_with("127.0.0.1", master.port(), fast())
            .await
            .unwrap();

        let err = directory.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::NoResponse(_)));
    }

    #[tokio::test]
    async fn consecutive_polls_use_fresh_tokens() {
        let open = spawn_game_server("open", "0").await;
        let master = spawn_master(vec![open]).await;
        let directory = UdpDirectory::connect_with("127.0.0.1", master.port(), fast())
            .await
            .unwrap();

        assert_eq!(directory.fetch().await.unwrap().len(), 1);
        assert_eq!(directory.fetch().await.unwrap().len(), 1);
        assert_eq!(directory.token.load(Ordering::Relaxed), 2);

        // answers with a stale token are not accepted
        let stale = packet::info_response(&["0", "0.6.4", "x", "dm1", "DM", "0", "0", "8", "0", "8"]);
        assert!(parse_info_response(&stale).is_ok());
        assert!(packet::parse_info_response_for(&stale, 2).is_err());
    }
}
