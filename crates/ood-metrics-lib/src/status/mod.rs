//! Apache status page retrieval
//!
//! Fetches `/server-status` from the portal front end and hands the body to
//! the table parser. Transport failures and a missing table are both
//! reported as errors the provider recovers from.

mod parser;

pub use parser::{parse_connection_table, FirstHeaderSelector, TableSelector, CONNECTION_TABLE_SENTINEL};

use crate::config::PortalConfig;
use crate::error::{MetricsError, Result};
use crate::models::ConnectionRecord;
use crate::observability::StructuredLogger;
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Path of the mod_status page
pub const STATUS_PATH: &str = "/server-status";

/// Port that switches the status URL to https
pub const TLS_PORT: u16 = 443;

/// Build the status page URL for a server
pub fn status_url(server_name: &str, port: u16) -> Result<Url> {
    let scheme = if port == TLS_PORT { "https" } else { "http" };
    let raw = format!("{}://{}:{}{}", scheme, server_name, port, STATUS_PATH);
    Url::parse(&raw).map_err(|e| MetricsError::Network {
        url: raw.clone(),
        reason: format!("invalid URL: {}", e),
    })
}

/// Source of the raw status page body
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Where the page is fetched from, for logging
    fn url(&self) -> String;

    async fn fetch_page(&self) -> Result<String>;
}

enum StatusTarget {
    Fixed(Url),
    /// Server name and port come from the portal file at fetch time
    Portal {
        config_path: PathBuf,
        default_servername: String,
    },
}

/// Fetches the status page over HTTP(S)
pub struct HttpStatusSource {
    client: Client,
    target: StatusTarget,
}

impl HttpStatusSource {
    /// Create a source for `server_name:port`
    pub fn new(server_name: &str, port: u16, timeout: Duration) -> Result<Self> {
        Self::with_url(status_url(server_name, port)?, timeout)
    }

    pub fn with_url(url: Url, timeout: Duration) -> Result<Self> {
        let client = Self::client(url.as_str(), timeout)?;
        Ok(Self {
            client,
            target: StatusTarget::Fixed(url),
        })
    }

    /// Create a source that re-reads the portal file before every fetch
    ///
    /// Edits to `servername` or `port` take effect on the next refresh.
    pub fn from_portal_config(
        config_path: impl Into<PathBuf>,
        default_servername: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let config_path = config_path.into();
        let client = Self::client(&config_path.display().to_string(), timeout)?;
        Ok(Self {
            client,
            target: StatusTarget::Portal {
                config_path,
                default_servername: default_servername.into(),
            },
        })
    }

    fn client(target: &str, timeout: Duration) -> Result<Client> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetricsError::Network {
                url: target.to_string(),
                reason: format!("failed to create HTTP client: {}", e),
            })
    }

    /// The URL the next fetch goes to
    pub fn resolve(&self) -> Result<Url> {
        match &self.target {
            StatusTarget::Fixed(url) => Ok(url.clone()),
            StatusTarget::Portal {
                config_path,
                default_servername,
            } => {
                let portal = PortalConfig::load(config_path, default_servername)?;
                status_url(&portal.servername, portal.port)
            }
        }
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    fn url(&self) -> String {
        match (self.resolve(), &self.target) {
            (Ok(url), _) => url.to_string(),
            // Unreadable portal file; point at it instead
            (Err(_), StatusTarget::Portal { config_path, .. }) => config_path.display().to_string(),
            (Err(_), StatusTarget::Fixed(url)) => url.to_string(),
        }
    }

    async fn fetch_page(&self) -> Result<String> {
        let url = self.resolve()?;
        let network = |reason: String| MetricsError::Network {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(network(format!("HTTP {}", status)));
        }

        response.text().await.map_err(|e| network(e.to_string()))
    }
}

/// Fetches the status page and extracts the connection table
pub struct StatusPageParser {
    source: Box<dyn StatusSource>,
    selector: Box<dyn TableSelector>,
    logger: StructuredLogger,
}

impl StatusPageParser {
    pub fn new(source: Box<dyn StatusSource>, logger: StructuredLogger) -> Self {
        Self::with_selector(source, Box::new(FirstHeaderSelector::default()), logger)
    }

    pub fn with_selector(source: Box<dyn StatusSource>, selector: Box<dyn TableSelector>, logger: StructuredLogger) -> Self {
        Self {
            source,
            selector,
            logger,
        }
    }

    pub fn url(&self) -> String {
        self.source.url()
    }

    /// One retrieval and parse of the status page
    pub async fn fetch_and_parse(&self) -> Result<Vec<ConnectionRecord>> {
        let body = match self.source.fetch_page().await {
            Ok(body) => body,
            Err(e) => {
                let url = match &e {
                    MetricsError::Network { url, .. } => url.clone(),
                    _ => self.source.url(),
                };
                self.logger.log_status_fetch_failed(&url, &e.to_string());
                return Err(e);
            }
        };

        match parse_connection_table(&body, self.selector.as_ref()) {
            Some(records) => {
                tracing::debug!(rows = records.len(), "Parsed connection table");
                Ok(records)
            }
            None => {
                let url = self.source.url();
                self.logger.log_table_missing(&url);
                Err(MetricsError::TableNotFound { url })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><table>
<tr><th>Srv</th><th>Client</th><th>Request</th></tr>
<tr><td>0-0</td><td>10.0.0.1</td><td>GET /node/c1/8080 HTTP/1.1</td></tr>
</table></body></html>"#;

    fn logger() -> StructuredLogger {
        StructuredLogger::new("test-host")
    }

    #[test]
    fn test_status_url_scheme() {
        assert_eq!(
            status_url("ondemand.example.edu", 443).unwrap().as_str(),
            "https://ondemand.example.edu/server-status"
        );
        assert_eq!(
            status_url("ondemand.example.edu", 80).unwrap().as_str(),
            "http://ondemand.example.edu/server-status"
        );
        assert_eq!(
            status_url("ondemand.example.edu", 8443).unwrap().as_str(),
            "http://ondemand.example.edu:8443/server-status"
        );
    }

    #[test]
    fn test_status_url_invalid_host() {
        assert!(matches!(status_url("bad host", 80), Err(MetricsError::Network { .. })));
    }

    #[tokio::test]
    async fn test_fetch_and_parse_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/server-status")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(PAGE)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}{}", server.url(), STATUS_PATH)).unwrap();
        let source = HttpStatusSource::with_url(url, Duration::from_secs(5)).unwrap();
        let parser = StatusPageParser::new(Box::new(source), logger());

        let records = parser.fetch_and_parse().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Client"], "10.0.0.1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_network_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/server-status")
            .with_status(403)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}{}", server.url(), STATUS_PATH)).unwrap();
        let source = HttpStatusSource::with_url(url, Duration::from_secs(5)).unwrap();
        let parser = StatusPageParser::new(Box::new(source), logger());

        let err = parser.fetch_and_parse().await.unwrap_err();
        assert!(matches!(err, MetricsError::Network { ref reason, .. } if reason.contains("403")));
    }

    #[tokio::test]
    async fn test_page_without_table_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/server-status")
            .with_status(200)
            .with_body("<html><body>Forbidden by config</body></html>")
            .create_async()
            .await;

        let url = Url::parse(&format!("{}{}", server.url(), STATUS_PATH)).unwrap();
        let source = HttpStatusSource::with_url(url, Duration::from_secs(5)).unwrap();
        let parser = StatusPageParser::new(Box::new(source), logger());

        assert!(matches!(
            parser.fetch_and_parse().await,
            Err(MetricsError::TableNotFound { .. })
        ));
    }

    fn portal_file(dir: &tempfile::TempDir, server: &mockito::ServerGuard) -> PathBuf {
        let host_with_port = server.host_with_port();
        let (host, port) = host_with_port.rsplit_once(':').unwrap();
        let path = dir.path().join("ood_portal.yml");
        std::fs::write(&path, format!("servername: {}\nport: {}\n", host, port)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_portal_config_reread_on_every_fetch() {
        let mut first = mockito::Server::new_async().await;
        let first_hit = first
            .mock("GET", "/server-status")
            .with_status(200)
            .with_body(PAGE)
            .expect(1)
            .create_async()
            .await;
        let mut second = mockito::Server::new_async().await;
        let second_hit = second
            .mock("GET", "/server-status")
            .with_status(200)
            .with_body(PAGE)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let path = portal_file(&dir, &first);
        let source = HttpStatusSource::from_portal_config(&path, "unused.example.edu", Duration::from_secs(5)).unwrap();
        let parser = StatusPageParser::new(Box::new(source), logger());

        assert_eq!(parser.fetch_and_parse().await.unwrap().len(), 1);

        // Portal moved to another port; no restart needed
        portal_file(&dir, &second);
        assert_eq!(parser.fetch_and_parse().await.unwrap().len(), 1);

        first_hit.assert_async().await;
        second_hit.assert_async().await;
    }

    #[test]
    fn test_portal_source_falls_back_to_default_servername() {
        let source = HttpStatusSource::from_portal_config(
            "/nonexistent/ood_portal.yml",
            "ondemand.example.edu",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(source.url(), "http://ondemand.example.edu/server-status");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_failure() {
        // Port 9 (discard) is closed on test hosts
        let source = HttpStatusSource::new("127.0.0.1", 9, Duration::from_secs(2)).unwrap();
        let parser = StatusPageParser::new(Box::new(source), logger());

        assert!(matches!(
            parser.fetch_and_parse().await,
            Err(MetricsError::Network { .. })
        ));
    }
}
