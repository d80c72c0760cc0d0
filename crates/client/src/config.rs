//! Client configuration.

use std::time::Duration;

use filesvc_protocol::ProtocolVersion;
use filesvc_protocol::constants::WS_REQUEST_TIMEOUT;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::http::Uri;

use crate::error::ClientError;

/// Connection settings for [`FileServiceClient`](crate::FileServiceClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Server URL, `ws://host:port[/path]` or `wss://...`.
    pub addr: String,
    /// Connect and unary request timeout in milliseconds; 0 means 15 s.
    pub timeout_ms: u64,
    /// Must match the server's configured version.
    pub protocol_version: ProtocolVersion,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            timeout_ms: 0,
            protocol_version: ProtocolVersion::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Effective timeout for connecting and for unary requests.
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            0 => WS_REQUEST_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    /// Checks that `addr` is a WebSocket URL with a host.
    pub fn validate(&self) -> Result<Uri, ClientError> {
        let uri: Uri = self
            .addr
            .parse()
            .map_err(|e| ClientError::InvalidAddr(format!("{}: {e}", self.addr)))?;
        match uri.scheme_str() {
            Some("ws" | "wss") => {}
            _ => {
                return Err(ClientError::InvalidAddr(format!(
                    "{}: scheme must be ws or wss",
                    self.addr
                )));
            }
        }
        if uri.host().is_none_or(str::is_empty) {
            return Err(ClientError::InvalidAddr(format!(
                "{}: missing host",
                self.addr
            )));
        }
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_uses_default() {
        let config = ClientConfig::new("ws://localhost:8080");
        assert_eq!(config.timeout(), Duration::from_secs(15));

        let config = ClientConfig {
            timeout_ms: 250,
            ..config
        };
        assert_eq!(config.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn accepts_ws_urls() {
        for addr in ["ws://127.0.0.1:9000", "wss://files.example.com/ws", "ws://[::1]:80"] {
            ClientConfig::new(addr).validate().unwrap();
        }
    }

    #[test]
    fn rejects_bad_addresses() {
        for addr in ["", "127.0.0.1:9000", "http://localhost", "ws:///nohost", "not a url"] {
            let err = ClientConfig::new(addr).validate().unwrap_err();
            assert!(
                matches!(err, ClientError::InvalidAddr(_)),
                "{addr:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn deserializes_camel_case() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"addr": "ws://h:1", "timeoutMs": 500, "protocolVersion": 1}"#,
        )
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.protocol_version, ProtocolVersion::InlineFilename);
    }
}
