//! Server configuration.
//!
//! Read from a camelCase JSON file; every field is optional and falls back
//! to its default.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use filesvc_protocol::ProtocolVersion;
use filesvc_protocol::constants::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_FILE_SIZE, MAX_CHUNK_PAYLOAD};
use filesvc_transfer::Settings;
use serde::{Deserialize, Serialize};

use crate::ServerError;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub host: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Initial state of the accept toggle.
    pub accept_connections: bool,
    /// Wire convention expected on `upload_open`.
    pub protocol_version: ProtocolVersion,
    /// Largest chunk payload advertised to clients.
    pub max_batch_size: u32,
    /// Largest accepted file; 0 disables the ceiling.
    pub max_file_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            accept_connections: true,
            protocol_version: ProtocolVersion::default(),
            max_batch_size: DEFAULT_BATCH_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Loads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let data = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded server config");
        Ok(config)
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ServerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rejects limits a client could not honour.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_batch_size == 0 {
            return Err(ServerError::InvalidConfig(
                "maxBatchSize must be positive".into(),
            ));
        }
        if self.max_batch_size as usize > MAX_CHUNK_PAYLOAD {
            return Err(ServerError::InvalidConfig(format!(
                "maxBatchSize {} exceeds the frame payload limit {MAX_CHUNK_PAYLOAD}",
                self.max_batch_size
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Settings for ServerConfig {
    fn batch_size(&self) -> u32 {
        self.max_batch_size
    }

    fn max_file_size(&self) -> u32 {
        self.max_file_size
    }

    fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 0);
        assert!(config.accept_connections);
        assert_eq!(config.protocol_version, ProtocolVersion::HeaderFilename);
        assert_eq!(config.batch_size(), 1024 * 1024);
        assert_eq!(config.max_file_size(), 100 * 1024 * 1024);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"port": 9000, "protocolVersion": 1}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.protocol_version, ProtocolVersion::InlineFilename);
        assert_eq!(config.max_batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn unknown_protocol_version_rejected() {
        let result = serde_json::from_str::<ServerConfig>(r#"{"protocolVersion": 7}"#);
        assert!(result.is_err());
    }

    #[test]
    fn zero_batch_size_invalid() {
        let config = ServerConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn oversized_batch_invalid() {
        let config = ServerConfig {
            max_batch_size: 16 * 1024 * 1024,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            max_batch_size: MAX_CHUNK_PAYLOAD as u32,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn settings_expose_constraints() {
        let config = ServerConfig {
            max_batch_size: 4096,
            max_file_size: 0,
            ..Default::default()
        };
        let c = config.constraints();
        assert_eq!(c.max_chunk_size, 4096);
        assert_eq!(c.file_limit(), None);
    }

    #[test]
    fn settings_carry_configured_version() {
        let config: ServerConfig = serde_json::from_str(r#"{"protocolVersion": 1}"#).unwrap();
        assert_eq!(
            Settings::protocol_version(&config),
            ProtocolVersion::InlineFilename
        );
        assert_eq!(
            Settings::protocol_version(&ServerConfig::default()),
            ProtocolVersion::HeaderFilename
        );
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("server").join("config.json");
        let config = ServerConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8443,
            max_file_size: 1 << 20,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.bind_addr().to_string(), "127.0.0.1:8443");
    }

    #[test]
    fn load_rejects_invalid_limits() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"maxBatchSize": 0}"#).unwrap();
        assert!(matches!(
            ServerConfig::load(&path),
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = ServerConfig::load(&tmp.path().join("absent.json"));
        assert!(matches!(result, Err(ServerError::Io(_))));
    }
}
