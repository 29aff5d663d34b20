//! The narrow interface the factory needs from a client library.

use async_trait::async_trait;
use rdc_core::{Auth, BackendError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of a single backend call.
///
/// `Ok(false)` is an ordinary refusal (connection refused, bad reply);
/// `Err` is a fault the caller may need to surface.
pub type BackendResult<T> = Result<T, BackendError>;

/// Marker prepended to the host for TLS transports.
pub const TLS_MARKER: &str = "tls://";

/// Where and how to open the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    /// Host, prefixed with [`TLS_MARKER`] for TLS.
    pub host: String,
    pub port: u16,
    pub timeout: Option<Duration>,
    pub read_write_timeout: Option<Duration>,
}

impl Endpoint {
    pub fn is_tls(&self) -> bool {
        self.host.starts_with(TLS_MARKER)
    }

    /// Host without the TLS marker.
    pub fn bare_host(&self) -> &str {
        self.host.strip_prefix(TLS_MARKER).unwrap_or(&self.host)
    }
}

/// How values are encoded by the typed helpers of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    /// Values are stored as given.
    #[default]
    None,
    Json,
}

/// One connection handle of the client library.
///
/// Methods take `&self`: handles are shared behind `Arc` once established.
#[async_trait]
pub trait BackendConnection: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint) -> BackendResult<bool>;

    /// Like `connect`, but the transport survives and re-establishes itself.
    async fn persistent_connect(&self, endpoint: &Endpoint) -> BackendResult<bool>;

    async fn authenticate(&self, auth: &Auth) -> BackendResult<bool>;

    async fn select(&self, database: u32) -> BackendResult<bool>;

    fn set_serializer(&self, serializer: Serializer) -> BackendResult<()>;

    fn set_prefix(&self, prefix: &str) -> BackendResult<()>;

    /// Release the transport. Must be idempotent.
    fn close(&self);
}

/// Opens fresh, unconnected handles.
pub trait Backend: Send + Sync + 'static {
    type Connection: BackendConnection;

    fn open(&self) -> Self::Connection;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_tls_marker() {
        let endpoint = Endpoint {
            host: "tls://redis.example.com".to_string(),
            port: 6380,
            timeout: None,
            read_write_timeout: None,
        };
        assert!(endpoint.is_tls());
        assert_eq!(endpoint.bare_host(), "redis.example.com");

        let plain = Endpoint {
            host: "127.0.0.1".to_string(),
            ..endpoint
        };
        assert!(!plain.is_tls());
        assert_eq!(plain.bare_host(), "127.0.0.1");
    }

    #[test]
    fn test_serializer_names() {
        assert_eq!(serde_json::to_string(&Serializer::Json).unwrap(), "\"json\"");
        assert_eq!(Serializer::default(), Serializer::None);
    }
}
