use std::path::Path;

use serde::Deserialize;
use tracing::warn;

/// Deployment options read from `options.json`. The core treats this as
/// immutable after startup; reloading `AppConfig` itself is out of scope.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cosmetic UI concern; ignored by the core entirely.
    #[serde(rename = "hideOnStart")]
    pub hide_on_start: bool,

    /// Comma-separated host specs; the supervisor creates one Agent per
    /// entry, each defaulting to port 53.
    #[serde(rename = "listenOn")]
    pub listen_on: String,

    #[serde(rename = "localNameServer")]
    pub local_name_server: String,

    #[serde(rename = "worldNameServer")]
    pub world_name_server: String,

    #[serde(rename = "useHttpQuery")]
    pub use_http_query: bool,

    #[serde(rename = "queryTimeout")]
    pub query_timeout_ms: u64,

    #[serde(rename = "compressionMutation")]
    pub compression_mutation: bool,

    #[serde(rename = "cacheResponse")]
    pub cache_response: bool,

    /// Ceiling on cached TTL in seconds; 0 means "use record TTL verbatim".
    #[serde(rename = "cacheAge")]
    pub cache_age: u32,

    /// `None` disables the ACL (allow everyone); `Some(vec![])` denies
    /// everyone; otherwise a CIDR allowlist.
    #[serde(rename = "networkWhitelist")]
    pub network_whitelist: Option<Vec<String>>,

    /// Ambient logging verbosity. The core never reads this; only `main.rs`
    /// consumes it to configure the `tracing-subscriber` filter.
    #[serde(rename = "logLevel")]
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hide_on_start: false,
            listen_on: "0.0.0.0:53".to_string(),
            local_name_server: "127.0.0.1:53".to_string(),
            world_name_server: "127.0.0.1:53".to_string(),
            use_http_query: false,
            query_timeout_ms: 4000,
            compression_mutation: false,
            cache_response: true,
            cache_age: 0,
            network_whitelist: None,
            log_level: None,
        }
    }
}

impl AppConfig {
    /// Loads `options.json`. A missing file yields defaults; a parse error
    /// is logged and defaults are used, matching the loader's specified
    /// tolerant behavior.
    pub fn load_or_default(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "options.json unreadable, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "options.json malformed, using defaults");
                Self::default()
            }
        }
    }

    pub fn listen_specs(&self) -> Vec<String> {
        self.listen_on
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.query_timeout_ms, 4000);
        assert!(cfg.cache_response);
        assert!(cfg.network_whitelist.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = AppConfig::load_or_default(Path::new("/nonexistent/options.json"));
        assert_eq!(cfg.listen_on, AppConfig::default().listen_on);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cfg = AppConfig::load_or_default(&path);
        assert_eq!(cfg.query_timeout_ms, AppConfig::default().query_timeout_ms);
    }

    #[test]
    fn listen_specs_splits_and_trims() {
        let mut cfg = AppConfig::default();
        cfg.listen_on = " 127.0.0.1:53, 0.0.0.0:5353 ".to_string();
        assert_eq!(cfg.listen_specs(), vec!["127.0.0.1:53", "0.0.0.0:5353"]);
    }
}
