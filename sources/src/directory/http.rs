use super::{
    DirectoryId,
    DirectoryProtocol,
    FetchError,
    Protocol,
    DEFAULT_POLL_TIMEOUT,
};
use crate::server::{
    GameServer,
    ServerList,
};
use reqwest::Client as HttpClient;
use std::{
    future::Future,
    pin::Pin,
    time::Duration,
};
use url::Url;

/// Master server publishing a DDNet style `servers.json`.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    url: Url,
    http_client: HttpClient,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(url: Url) -> Self {
        Self::with_client(url, HttpClient::new())
    }

    /// Shares one connection pool between several masters.
    pub fn with_client(url: Url, http_client: HttpClient) -> Self {
        Self {
            url,
            http_client,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch_servers(&self) -> Result<Vec<GameServer>, FetchError> {
        let response = self
            .http_client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let list: ServerList = response.json().await?;
        Ok(list.servers)
    }
}

impl DirectoryProtocol for HttpDirectory {
    fn id(&self) -> DirectoryId {
        DirectoryId::new(Protocol::Http, self.url.as_str())
    }

    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<Vec<GameServer>, FetchError>> + Send + '_>> {
        Box::pin(self.fetch_servers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::{
        io::{
            AsyncReadExt as _,
            AsyncWriteExt as _,
        },
        net::TcpListener,
    };

    /// Serves exactly one canned HTTP response on a loopback port.
    async fn serve_once(status: &'static str, body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = stream.read(&mut request).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{address}/ddnet/15/servers.json")).unwrap()
    }

    #[tokio::test]
    async fn decodes_listing() {
        let url = serve_once(
            "200 OK",
            r#"{"servers":[{"addresses":["tw-0.6+udp://127.0.0.1:8303"],"info":{"name":"test","passworded":false,"game_type":"DM","max_players":16,"map":{"name":"dm1"},"version":"0.6.4","clients":[{"name":"a","is_player":true},{"name":"b","is_player":false}]}}]}"#,
        )
        .await;
        let directory = HttpDirectory::new(url.clone());
        assert_eq!(directory.id(), DirectoryId::new(Protocol::Http, url.as_str()));

        let servers = directory.fetch().await.unwrap();
        assert_eq!(servers.len(), 1);
        assert!(!servers[0].info.passworded);
        assert_eq!(servers[0].info.game_type, "DM");
        assert_eq!(servers[0].player_count(), 2);
    }

    #[tokio::test]
    async fn masters_share_one_client() {
        let listing = r#"{"servers":[{"addresses":["tw-0.6+udp://127.0.0.1:8303"],"info":{"name":"shared"}}]}"#;
        let client = HttpClient::new();
        let first = HttpDirectory::with_client(serve_once("200 OK", listing).await, client.clone());
        let second = HttpDirectory::with_client(serve_once("200 OK", listing).await, client);
        assert_ne!(first.id(), second.id());

        for directory in [first, second] {
            let servers = directory.fetch().await.unwrap();
            assert_eq!(servers[0].info.name, "shared");
        }
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let err = HttpDirectory::new(url).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(status) if status.as_u16() == 503));
    }

    #[tokio::test]
    async fn malformed_body_fails() {
        let url = serve_once("200 OK", r#"{"servers": "nope"}"#).await;
        let err = HttpDirectory::new(url).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Http(ref err) if err.is_decode()));
    }

    #[tokio::test]
    async fn unreachable_master_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{address}/servers.json")).unwrap();
        let err = HttpDirectory::new(url).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }
}
