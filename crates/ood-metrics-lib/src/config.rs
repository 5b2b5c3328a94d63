//! Provider configuration
//!
//! Two sources feed the provider: the portal's own YAML file (read-only,
//! supplies the front-end server name and port) and `OOD_METRICS_*`
//! environment variables for the provider's tunables.

use crate::error::Result;
use crate::owners::DEFAULT_LIST_COMMAND;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_PORTAL_CONFIG: &str = "/etc/ood/config/ood_portal.yml";

/// Host name used when nothing better is configured
pub fn default_fqdn() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Provider tunables
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Minimum seconds between refresh cycles
    #[serde(default = "default_min_poll_seconds")]
    pub min_poll_seconds: u64,

    #[serde(default = "default_portal_config_path")]
    pub portal_config_path: PathBuf,

    /// argv of the active PUN listing command
    #[serde(default = "default_list_command")]
    pub nginx_stage_command: Vec<String>,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Proc root the user/system CPU split is read from
    #[serde(default = "default_proc_path")]
    pub proc_path: PathBuf,

    /// Name this host appears under in the status page Client column
    #[serde(default = "default_fqdn")]
    pub self_fqdn: String,

    /// Seconds between harness print rounds
    #[serde(default = "default_print_interval")]
    pub print_interval_secs: u64,
}

fn default_min_poll_seconds() -> u64 {
    30
}

fn default_portal_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_PORTAL_CONFIG)
}

fn default_list_command() -> Vec<String> {
    DEFAULT_LIST_COMMAND.iter().map(|s| s.to_string()).collect()
}

fn default_command_timeout() -> u64 {
    10
}

fn default_http_timeout() -> u64 {
    10
}

fn default_proc_path() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_print_interval() -> u64 {
    20
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            min_poll_seconds: default_min_poll_seconds(),
            portal_config_path: default_portal_config_path(),
            nginx_stage_command: default_list_command(),
            command_timeout_secs: default_command_timeout(),
            http_timeout_secs: default_http_timeout(),
            proc_path: default_proc_path(),
            self_fqdn: default_fqdn(),
            print_interval_secs: default_print_interval(),
        }
    }
}

impl ProviderConfig {
    /// Load configuration from `OOD_METRICS_*` environment variables
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("OOD_METRICS")
                    .list_separator(" ")
                    .with_list_parse_key("nginx_stage_command"),
            )
            .build()?;

        let mut loaded: ProviderConfig = config.try_deserialize()?;
        // A zero interval would refresh on every single query
        loaded.min_poll_seconds = loaded.min_poll_seconds.max(1);
        Ok(loaded)
    }
}

/// Front-end server settings from the portal YAML file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub servername: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
struct RawPortalConfig {
    servername: Option<String>,
    port: Option<u16>,
}

impl PortalConfig {
    /// Read the portal YAML file; a missing file yields the defaults
    pub fn load(path: &Path, default_servername: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml).required(false))
            .build()?;
        let raw: RawPortalConfig = config.try_deserialize()?;

        Ok(Self {
            servername: raw
                .servername
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default_servername.to_string()),
            port: raw.port.unwrap_or(80),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_provider_config_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.min_poll_seconds, 30);
        assert_eq!(config.portal_config_path, PathBuf::from(DEFAULT_PORTAL_CONFIG));
        assert_eq!(
            config.nginx_stage_command,
            vec!["sudo", "/opt/ood/nginx_stage/sbin/nginx_stage", "nginx_list"]
        );
        assert_eq!(config.print_interval_secs, 20);
        assert!(!config.self_fqdn.is_empty());
    }

    #[test]
    fn test_portal_config_missing_file_uses_defaults() {
        let portal = PortalConfig::load(Path::new("/nonexistent/ood_portal.yml"), "host.example.edu").unwrap();
        assert_eq!(
            portal,
            PortalConfig {
                servername: "host.example.edu".to_string(),
                port: 80
            }
        );
    }

    #[test]
    fn test_portal_config_reads_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ood_portal.yml");
        fs::write(
            &path,
            "---\nservername: ondemand.example.edu\nport: 443\nssl:\n  - 'SSLCertificateFile \"/etc/pki/cert.crt\"'\nlogroot: \"/var/log/httpd\"\n",
        )
        .unwrap();

        let portal = PortalConfig::load(&path, "fallback").unwrap();
        assert_eq!(portal.servername, "ondemand.example.edu");
        assert_eq!(portal.port, 443);
    }

    #[test]
    fn test_portal_config_null_servername_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ood_portal.yml");
        fs::write(&path, "servername: null\n").unwrap();

        let portal = PortalConfig::load(&path, "fallback.example.edu").unwrap();
        assert_eq!(portal.servername, "fallback.example.edu");
        assert_eq!(portal.port, 80);
    }
}
