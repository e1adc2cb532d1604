use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use contactlink_engine::EngineConfig;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_path: String,
    pub max_attempts: u32,
    /// Add `secondaryEmails` / `secondaryPhoneNumbers` to identify responses.
    pub include_secondary_details: bool,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            database_path: "contacts.db".into(),
            max_attempts: EngineConfig::default().max_attempts,
            include_secondary_details: false,
            log_filter: "info".into(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.database_path, "contacts.db");
        assert_eq!(c.max_attempts, 3);
        assert!(!c.include_secondary_details);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let c = ServerConfig::from_toml(
            r#"
            database_path = "/var/lib/contacts.db"
            include_secondary_details = true
            "#,
        )
        .unwrap();
        assert_eq!(c.database_path, "/var/lib/contacts.db");
        assert!(c.include_secondary_details);
        assert_eq!(c.engine_config().max_attempts, 3);
        assert_eq!(c.log_filter, "info");
    }

    #[test]
    fn malformed_file_is_config_error() {
        let err = ServerConfig::from_toml("bind_addr = 12").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "bind_addr = \"0.0.0.0:8080\"\nmax_attempts = 5\n").unwrap();
        let c = ServerConfig::load(&path).unwrap();
        assert_eq!(c.bind_addr.port(), 8080);
        assert_eq!(c.max_attempts, 5);
    }
}
