//! Connection classification
//!
//! Turns status page rows into websocket and client connection counters.
//! Only requests routed to the portal are counted; other Apache traffic on
//! the same server is ignored.

use crate::models::{ConnectionCounts, ConnectionRecord};
use std::collections::BTreeSet;

/// Request path fragments that identify portal traffic
pub const PORTAL_MARKERS: &[&str] = &["/node/", "/rnode/", "/pun/", "/nginx/", "/oidc", "/discover", "/register"];

/// Request fragments that identify websocket traffic
pub const WEBSOCKET_MARKERS: &[&str] = &["/node/", "/rnode/", "websockify"];

pub const REQUEST_COLUMN: &str = "Request";
pub const CLIENT_COLUMN: &str = "Client";

/// Names the host uses for itself; connections from these are not clients
#[derive(Debug, Clone)]
pub struct SelfIdentity {
    names: Vec<String>,
}

impl SelfIdentity {
    /// The host FQDN plus the loopback names
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self {
            names: vec![fqdn.into(), "localhost".to_string(), "127.0.0.1".to_string()],
        }
    }

    pub fn contains(&self, client: &str) -> bool {
        self.names.iter().any(|n| n == client)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Count websocket and client connections with per-client deduplication
pub fn classify(records: &[ConnectionRecord], identity: &SelfIdentity) -> ConnectionCounts {
    let mut counts = ConnectionCounts::default();
    let mut websocket_clients: BTreeSet<&str> = BTreeSet::new();
    let mut clients: BTreeSet<&str> = BTreeSet::new();

    for record in records {
        let (Some(request), Some(client)) = (record.get(REQUEST_COLUMN), record.get(CLIENT_COLUMN)) else {
            continue;
        };

        if !contains_any(request, PORTAL_MARKERS) {
            tracing::debug!(request = %request, "Skipping non-portal request");
            continue;
        }

        if contains_any(request, WEBSOCKET_MARKERS) {
            counts.websocket_connections += 1;
            websocket_clients.insert(client.as_str());
        }

        if !identity.contains(client) {
            counts.client_connections += 1;
            clients.insert(client.as_str());
        }
    }

    counts.unique_websocket_clients = websocket_clients.len() as u64;
    counts.unique_client_connections = clients.len() as u64;
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    const FQDN: &str = "ondemand.example.edu";

    fn record(request: &str, client: &str) -> ConnectionRecord {
        let mut r = ConnectionRecord::new();
        r.insert(REQUEST_COLUMN.to_string(), request.to_string());
        r.insert(CLIENT_COLUMN.to_string(), client.to_string());
        r
    }

    #[test]
    fn test_reference_rows() {
        let records = vec![
            record("/node/1", "10.0.0.1"),
            record("/pun/2", "10.0.0.1"),
            record("/other", "10.0.0.2"),
            record("/pun/3", FQDN),
        ];
        let counts = classify(&records, &SelfIdentity::new(FQDN));

        assert_eq!(counts.websocket_connections, 1);
        assert_eq!(counts.unique_websocket_clients, 1);
        assert_eq!(counts.client_connections, 2);
        assert_eq!(counts.unique_client_connections, 1);
    }

    #[test]
    fn test_missing_columns_skipped() {
        let mut no_client = ConnectionRecord::new();
        no_client.insert(REQUEST_COLUMN.to_string(), "/node/1".to_string());
        let mut no_request = ConnectionRecord::new();
        no_request.insert(CLIENT_COLUMN.to_string(), "10.0.0.1".to_string());

        let counts = classify(&[no_client, no_request], &SelfIdentity::new(FQDN));
        assert_eq!(counts, ConnectionCounts::default());
    }

    #[test]
    fn test_websockify_needs_portal_marker() {
        // websockify alone is not portal traffic
        let counts = classify(&[record("GET /websockify HTTP/1.1", "10.0.0.5")], &SelfIdentity::new(FQDN));
        assert_eq!(counts.websocket_connections, 0);

        let counts = classify(
            &[record("GET /pun/sys/dashboard/noVNC/websockify HTTP/1.1", "10.0.0.5")],
            &SelfIdentity::new(FQDN),
        );
        assert_eq!(counts.websocket_connections, 1);
        assert_eq!(counts.client_connections, 1);
    }

    #[test]
    fn test_loopback_clients_are_not_clients() {
        let records = vec![
            record("/rnode/c1/5900/websockify", "localhost"),
            record("/rnode/c1/5900/websockify", "127.0.0.1"),
        ];
        let counts = classify(&records, &SelfIdentity::new(FQDN));

        assert_eq!(counts.websocket_connections, 2);
        assert_eq!(counts.unique_websocket_clients, 2);
        assert_eq!(counts.client_connections, 0);
        assert_eq!(counts.unique_client_connections, 0);
    }

    #[test]
    fn test_auth_paths_count_as_clients() {
        let records = vec![
            record("GET /oidc?code=abc HTTP/1.1", "10.0.0.7"),
            record("GET /discover HTTP/1.1", "10.0.0.8"),
            record("POST /register HTTP/1.1", "10.0.0.8"),
            record("GET /nginx/stop HTTP/1.1", "10.0.0.9"),
        ];
        let counts = classify(&records, &SelfIdentity::new(FQDN));

        assert_eq!(counts.websocket_connections, 0);
        assert_eq!(counts.client_connections, 4);
        assert_eq!(counts.unique_client_connections, 3);
    }

    #[test]
    fn test_unique_never_exceeds_raw() {
        let clients = ["10.0.0.1", "10.0.0.2", "localhost", FQDN, "10.0.0.1"];
        let requests = ["/node/a", "/pun/b", "/rnode/c", "/other", "/pun/websockify"];
        let mut records = Vec::new();
        for (i, client) in clients.iter().enumerate() {
            for request in requests.iter().skip(i % 2) {
                records.push(record(request, client));
            }
        }

        let counts = classify(&records, &SelfIdentity::new(FQDN));
        assert!(counts.unique_websocket_clients <= counts.websocket_connections);
        assert!(counts.unique_client_connections <= counts.client_connections);
        assert!(counts.websocket_connections > 0);
        assert!(counts.client_connections > 0);
    }
}
