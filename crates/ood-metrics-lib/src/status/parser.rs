//! Connection table extraction from the Apache status page

use crate::models::ConnectionRecord;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// First header cell of the mod_status connection table
pub const CONNECTION_TABLE_SENTINEL: &str = "Srv";

static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

/// Decides which table on the page holds the connections
pub trait TableSelector: Send + Sync {
    fn matches(&self, headers: &[String]) -> bool;
}

impl<F> TableSelector for F
where
    F: Fn(&[String]) -> bool + Send + Sync,
{
    fn matches(&self, headers: &[String]) -> bool {
        self(headers)
    }
}

/// Selects the first table whose first header cell equals a label
#[derive(Debug, Clone)]
pub struct FirstHeaderSelector {
    label: String,
}

impl FirstHeaderSelector {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl Default for FirstHeaderSelector {
    fn default() -> Self {
        Self::new(CONNECTION_TABLE_SENTINEL)
    }
}

impl TableSelector for FirstHeaderSelector {
    fn matches(&self, headers: &[String]) -> bool {
        headers.first().map(|h| h == &self.label).unwrap_or(false)
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.select(&CELL).map(cell_text).collect()
}

/// Parse the page and return the rows of the first selected table
///
/// The first row supplies the column headers; each following row is paired
/// with them by position, stopping at the shorter of the two. Empty cells are
/// left out of the record. Returns `None` when no table matches.
pub fn parse_connection_table(html: &str, selector: &dyn TableSelector) -> Option<Vec<ConnectionRecord>> {
    let document = Html::parse_document(html);

    for table in document.select(&TABLE) {
        let mut rows = table.select(&ROW);
        let Some(header_row) = rows.next() else {
            continue;
        };
        let headers = row_cells(header_row);
        if !selector.matches(&headers) {
            continue;
        }
        tracing::debug!(headers = ?headers, "Found connection table");

        let records = rows
            .map(|row| {
                headers
                    .iter()
                    .zip(row_cells(row))
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(header, value)| (header.clone(), value))
                    .collect::<ConnectionRecord>()
            })
            .collect();
        return Some(records);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS_PAGE: &str = r#"<html><body>
<h1>Apache Server Status</h1>
<table border="0"><tr><th>Srv</th><th>PID</th><th>Client</th><th>Request</th></tr>
<tr><td><b>0-0</b></td><td>1201</td><td>10.0.0.1</td><td nowrap>GET /pun/sys/dashboard HTTP/1.1</td></tr>
</table>
</body></html>"#;

    fn default_selector() -> FirstHeaderSelector {
        FirstHeaderSelector::default()
    }

    #[test]
    fn test_parses_four_rows_positionally() {
        let html = r#"<table>
<tr><th>Srv</th><th>Client</th><th>Request</th></tr>
<tr><td>0-0</td><td>10.0.0.1</td><td>GET /node/host/8080 HTTP/1.1</td></tr>
<tr><td>1-0</td><td>10.0.0.2</td><td>GET /pun/sys/files HTTP/1.1</td></tr>
<tr><td>2-0</td><td>localhost</td><td>GET /nginx/init HTTP/1.1</td></tr>
<tr><td>3-0</td><td>10.0.0.3</td><td>GET /oidc HTTP/1.1</td></tr>
</table>"#;
        let records = parse_connection_table(html, &default_selector()).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["Srv"], "0-0");
        assert_eq!(records[0]["Client"], "10.0.0.1");
        assert_eq!(records[1]["Request"], "GET /pun/sys/files HTTP/1.1");
        assert_eq!(records[2]["Client"], "localhost");
        assert_eq!(records[3]["Srv"], "3-0");
    }

    #[test]
    fn test_skips_earlier_non_sentinel_table() {
        let html = r#"
<table><tr><th>Slot</th><th>Client</th><th>Request</th></tr>
<tr><td>x</td><td>1.1.1.1</td><td>/decoy</td></tr></table>
<table><tr><th>Srv</th><th>Client</th><th>Request</th></tr>
<tr><td>0-0</td><td>2.2.2.2</td><td>/pun/real</td></tr></table>"#;
        let records = parse_connection_table(html, &default_selector()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Client"], "2.2.2.2");
    }

    #[test]
    fn test_nested_markup_in_cells() {
        let records = parse_connection_table(STATUS_PAGE, &default_selector()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Srv"], "0-0");
        assert_eq!(records[0]["PID"], "1201");
        assert_eq!(records[0]["Request"], "GET /pun/sys/dashboard HTTP/1.1");
    }

    #[test]
    fn test_missing_table_is_none() {
        let html = "<html><body><table><tr><th>Scoreboard</th></tr></table></body></html>";
        assert!(parse_connection_table(html, &default_selector()).is_none());
        assert!(parse_connection_table("", &default_selector()).is_none());
    }

    #[test]
    fn test_short_and_long_rows_truncate() {
        let html = r#"<table>
<tr><th>Srv</th><th>Client</th><th>Request</th></tr>
<tr><td>0-0</td><td>10.0.0.1</td></tr>
<tr><td>1-0</td><td>10.0.0.2</td><td>/pun/a</td><td>extra</td></tr>
</table>"#;
        let records = parse_connection_table(html, &default_selector()).unwrap();

        assert_eq!(records[0].len(), 2);
        assert!(!records[0].contains_key("Request"));
        assert_eq!(records[1].len(), 3);
        assert_eq!(records[1]["Request"], "/pun/a");
    }

    #[test]
    fn test_empty_cells_are_absent() {
        let html = r#"<table><tr><th>Srv</th><th>Client</th><th>Request</th></tr>
<tr><td>0-0</td><td>  </td><td>/pun/a</td></tr></table>"#;
        let records = parse_connection_table(html, &default_selector()).unwrap();
        assert!(!records[0].contains_key("Client"));
    }

    #[test]
    fn test_closure_selector() {
        let html = r#"<table><tr><th>Slot</th><th>Client</th></tr><tr><td>1</td><td>h</td></tr></table>"#;
        let selector = |headers: &[String]| headers.iter().any(|h| h == "Client");
        let records = parse_connection_table(html, &selector).unwrap();
        assert_eq!(records[0]["Client"], "h");
    }
}
