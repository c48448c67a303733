//! Server configuration read from the environment

use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_ADDR: &str = "0.0.0.0:7777";
const DEFAULT_DATA_DIR: &str = ".playground-data";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    /// App id reported by the status endpoint
    pub app_id: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            app_id: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let addr = match lookup("PLAYGROUND_ADDR") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(
                    "Ignoring malformed PLAYGROUND_ADDR {:?}, using {}",
                    raw,
                    DEFAULT_ADDR
                );
                defaults.addr
            }),
            None => defaults.addr,
        };

        let data_dir = lookup("PLAYGROUND_DATA_DIR")
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let app_id = lookup("PLAYGROUND_APP_ID")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        Self {
            addr,
            data_dir,
            app_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(config.app_id.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PLAYGROUND_ADDR", "127.0.0.1:9000"),
            ("PLAYGROUND_DATA_DIR", "/tmp/pg"),
            ("PLAYGROUND_APP_ID", " demo "),
        ]);
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/pg"));
        assert_eq!(config.app_id.as_deref(), Some("demo"));
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = config(&[("PLAYGROUND_ADDR", "not-an-addr"), ("PLAYGROUND_APP_ID", "")]);
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert!(config.app_id.is_none());
    }
}
