//! Connection establishment.
//!
//! Runs connect, authenticate, select and configure against a fresh handle,
//! stopping at the first step that fails.

use crate::backend::{BackendConnection, BackendResult, Endpoint, Serializer, TLS_MARKER};
use rdc_core::{BackendError, ConnectionParams};
use tracing::{debug, error};

/// Turns resolved parameters into a usable connection.
#[derive(Debug, Clone, Copy)]
pub struct Connector {
    serializer: Serializer,
}

impl Default for Connector {
    fn default() -> Self {
        Self {
            serializer: Serializer::Json,
        }
    }
}

impl Connector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another serializer for established connections.
    pub fn with_serializer(serializer: Serializer) -> Self {
        Self { serializer }
    }

    /// Establish `conn` with `params`.
    ///
    /// Returns `Ok(false)` when any step fails, including backend faults,
    /// which are logged. Only auth rejections come back as `Err`.
    pub async fn connect<C>(&self, conn: &C, params: &ConnectionParams) -> Result<bool, BackendError>
    where
        C: BackendConnection + ?Sized,
    {
        match self.establish(conn, params).await {
            Ok(established) => Ok(established),
            Err(fault) if fault.is_auth_rejection() => Err(fault),
            Err(fault) => {
                error!(
                    host = %params.host,
                    port = params.port,
                    error = %fault,
                    "Redis connection failed"
                );
                Ok(false)
            }
        }
    }

    async fn establish<C>(&self, conn: &C, params: &ConnectionParams) -> BackendResult<bool>
    where
        C: BackendConnection + ?Sized,
    {
        if !self.open_transport(conn, params).await? {
            debug!(host = %params.host, port = params.port, "Transport not established");
            return Ok(false);
        }

        if !self.authenticate(conn, params).await? {
            debug!(host = %params.host, "Authentication refused");
            return Ok(false);
        }

        if !self.select_database(conn, params).await? {
            debug!(database = params.database, "Database selection refused");
            return Ok(false);
        }

        self.configure_options(conn, params)?;

        Ok(true)
    }

    async fn open_transport<C>(&self, conn: &C, params: &ConnectionParams) -> BackendResult<bool>
    where
        C: BackendConnection + ?Sized,
    {
        let endpoint = endpoint(params);
        if params.persistent {
            conn.persistent_connect(&endpoint).await
        } else {
            conn.connect(&endpoint).await
        }
    }

    async fn authenticate<C>(&self, conn: &C, params: &ConnectionParams) -> BackendResult<bool>
    where
        C: BackendConnection + ?Sized,
    {
        match &params.auth {
            Some(auth) if !auth.is_empty() => conn.authenticate(auth).await,
            _ => Ok(true),
        }
    }

    async fn select_database<C>(&self, conn: &C, params: &ConnectionParams) -> BackendResult<bool>
    where
        C: BackendConnection + ?Sized,
    {
        if params.database == 0 {
            return Ok(true);
        }
        conn.select(params.database).await
    }

    fn configure_options<C>(&self, conn: &C, params: &ConnectionParams) -> BackendResult<()>
    where
        C: BackendConnection + ?Sized,
    {
        conn.set_serializer(self.serializer)?;

        if let Some(prefix) = params.key_prefix() {
            conn.set_prefix(prefix)?;
        }

        Ok(())
    }
}

/// Transport endpoint for `params`; TLS hosts carry the `tls://` marker.
pub(crate) fn endpoint(params: &ConnectionParams) -> Endpoint {
    let host = if params.ssl {
        format!("{}{}", TLS_MARKER, params.host)
    } else {
        params.host.clone()
    };

    Endpoint {
        host,
        port: params.port,
        timeout: params.connect_timeout(),
        read_write_timeout: params.response_timeout(),
    }
}
