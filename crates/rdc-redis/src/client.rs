//! Redis connection handles.

use async_trait::async_trait;
use rdc_core::{Auth, BackendError};
use rdc_factory::{Backend, BackendConnection, BackendResult, Endpoint, Serializer};
use redis::aio::{ConnectionLike, ConnectionManager, ConnectionManagerConfig, MultiplexedConnection};
use redis::{AsyncConnectionConfig, Cmd, ConnectionInfo, Pipeline, RedisFuture, Value};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Redis error types.
#[derive(Error, Debug)]
pub enum RedisError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection is closed")]
    Closed,

    #[error("Unsupported value: {0}")]
    Unsupported(String),
}

/// Result type for Redis operations.
pub type RedisResult<T> = Result<T, RedisError>;

/// The live transport behind a [`RedisConnection`].
///
/// Both variants are cheap to clone and multiplex commands internally.
#[derive(Clone)]
pub enum RedisTransport {
    Multiplexed(MultiplexedConnection),
    /// Reconnects on its own; used for persistent connections.
    Managed(ConnectionManager),
}

impl ConnectionLike for RedisTransport {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            RedisTransport::Multiplexed(conn) => conn.req_packed_command(cmd),
            RedisTransport::Managed(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            RedisTransport::Multiplexed(conn) => conn.req_packed_commands(cmd, offset, count),
            RedisTransport::Managed(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            RedisTransport::Multiplexed(conn) => conn.get_db(),
            RedisTransport::Managed(conn) => conn.get_db(),
        }
    }
}

/// Opens [`RedisConnection`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisBackend;

impl Backend for RedisBackend {
    type Connection = RedisConnection;

    fn open(&self) -> RedisConnection {
        RedisConnection::new()
    }
}

/// What a [`ConnectionManager`] needs to reconnect on its own.
#[derive(Clone)]
struct Reconnect {
    info: ConnectionInfo,
    config: ConnectionManagerConfig,
}

#[derive(Default)]
struct State {
    transport: Option<RedisTransport>,
    /// Set for persistent connections only.
    reconnect: Option<Reconnect>,
    serializer: Serializer,
    prefix: Option<String>,
}

/// One dedicated Redis connection.
#[derive(Default)]
pub struct RedisConnection {
    state: Mutex<State>,
}

impl RedisConnection {
    /// An unconnected handle.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A clone of the transport for issuing commands.
    ///
    /// The transport implements `ConnectionLike`, so `redis::AsyncCommands`
    /// work on it directly. Keys are not prefixed on this path.
    pub fn command(&self) -> RedisResult<RedisTransport> {
        self.state().transport.clone().ok_or(RedisError::Closed)
    }

    pub fn is_connected(&self) -> bool {
        self.state().transport.is_some()
    }

    pub fn serializer(&self) -> Serializer {
        self.state().serializer
    }

    pub fn prefix(&self) -> Option<String> {
        self.state().prefix.clone()
    }

    /// `key` with the configured prefix applied.
    pub fn prefixed_key(&self, key: &str) -> String {
        match &self.state().prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Connection details a persistent handle replays after reconnecting.
    pub fn reconnect_info(&self) -> Option<ConnectionInfo> {
        self.state().reconnect.as_ref().map(|r| r.info.clone())
    }

    async fn open_transport(&self, endpoint: &Endpoint, persistent: bool) -> BackendResult<bool> {
        if endpoint.is_tls() {
            install_crypto_provider();
        }

        let client = redis::Client::open(connection_url(endpoint).as_str()).map_err(to_fault)?;

        let opened = if persistent {
            let config = manager_config(endpoint);
            let reconnect = Reconnect {
                info: client.get_connection_info().clone(),
                config: config.clone(),
            };
            ConnectionManager::new_with_config(client, config)
                .await
                .map(|manager| (RedisTransport::Managed(manager), Some(reconnect)))
        } else {
            client
                .get_multiplexed_async_connection_with_config(&connection_config(endpoint))
                .await
                .map(|conn| (RedisTransport::Multiplexed(conn), None))
        };

        match opened {
            Ok((transport, reconnect)) => {
                let mut state = self.state();
                state.transport = Some(transport);
                state.reconnect = reconnect;
                Ok(true)
            }
            Err(e) if e.is_io_error() || e.is_timeout() || e.is_connection_refusal() => {
                debug!(host = %endpoint.host, port = endpoint.port, error = %e, "Redis transport refused");
                Ok(false)
            }
            Err(e) => Err(to_fault(e)),
        }
    }

    async fn run(&self, cmd: Cmd) -> BackendResult<()> {
        let mut transport = self
            .command()
            .map_err(|e| BackendError::new(e.to_string()))?;
        let reply: redis::RedisResult<()> = cmd.query_async(&mut transport).await;
        reply.map_err(to_fault)
    }

    /// Rebuild a persistent transport so reconnects carry `update`.
    ///
    /// A non-persistent handle is left alone.
    async fn remember(&self, update: impl FnOnce(&mut ConnectionInfo)) -> BackendResult<()> {
        let Some(mut reconnect) = self.state().reconnect.clone() else {
            return Ok(());
        };
        update(&mut reconnect.info);

        let client = redis::Client::open(reconnect.info.clone()).map_err(to_fault)?;
        let manager = ConnectionManager::new_with_config(client, reconnect.config.clone())
            .await
            .map_err(to_fault)?;

        let mut state = self.state();
        if state.transport.is_none() {
            return Err(BackendError::new(RedisError::Closed.to_string()));
        }
        debug!(db = reconnect.info.redis.db, "Persistent Redis transport rebuilt");
        state.transport = Some(RedisTransport::Managed(manager));
        state.reconnect = Some(reconnect);
        Ok(())
    }
}

#[async_trait]
impl BackendConnection for RedisConnection {
    async fn connect(&self, endpoint: &Endpoint) -> BackendResult<bool> {
        self.open_transport(endpoint, false).await
    }

    async fn persistent_connect(&self, endpoint: &Endpoint) -> BackendResult<bool> {
        self.open_transport(endpoint, true).await
    }

    async fn authenticate(&self, auth: &Auth) -> BackendResult<bool> {
        let mut cmd = redis::cmd("AUTH");
        match auth {
            Auth::Password(secret) => cmd.arg(secret),
            Auth::UserPassword { username, password } => cmd.arg(username).arg(password),
        };
        self.run(cmd).await?;
        self.remember(|info| with_auth(info, auth)).await?;
        Ok(true)
    }

    async fn select(&self, database: u32) -> BackendResult<bool> {
        let mut cmd = redis::cmd("SELECT");
        cmd.arg(database);
        self.run(cmd).await?;
        self.remember(|info| info.redis.db = i64::from(database)).await?;
        Ok(true)
    }

    fn set_serializer(&self, serializer: Serializer) -> BackendResult<()> {
        self.state().serializer = serializer;
        Ok(())
    }

    fn set_prefix(&self, prefix: &str) -> BackendResult<()> {
        self.state().prefix = Some(prefix.to_string());
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state();
        state.reconnect = None;
        if state.transport.take().is_some() {
            debug!("Redis transport closed");
        }
    }
}

/// redis-rs URL for an endpoint; only transport details are encoded.
pub fn connection_url(endpoint: &Endpoint) -> String {
    let scheme = if endpoint.is_tls() { "rediss" } else { "redis" };
    let host = endpoint.bare_host();
    if host.contains(':') && !host.starts_with('[') {
        format!("{}://[{}]:{}", scheme, host, endpoint.port)
    } else {
        format!("{}://{}:{}", scheme, host, endpoint.port)
    }
}

fn connection_config(endpoint: &Endpoint) -> AsyncConnectionConfig {
    let mut config = AsyncConnectionConfig::new();
    if let Some(timeout) = endpoint.timeout {
        config = config.set_connection_timeout(timeout);
    }
    if let Some(timeout) = endpoint.read_write_timeout {
        config = config.set_response_timeout(timeout);
    }
    config
}

fn manager_config(endpoint: &Endpoint) -> ConnectionManagerConfig {
    let mut config = ConnectionManagerConfig::new();
    if let Some(timeout) = endpoint.timeout {
        config = config.set_connection_timeout(timeout);
    }
    if let Some(timeout) = endpoint.read_write_timeout {
        config = config.set_response_timeout(timeout);
    }
    config
}

fn with_auth(info: &mut ConnectionInfo, auth: &Auth) {
    match auth {
        Auth::Password(secret) => {
            info.redis.username = None;
            info.redis.password = Some(secret.clone());
        }
        Auth::UserPassword { username, password } => {
            info.redis.username = Some(username.clone());
            info.redis.password = Some(password.clone());
        }
    }
}

/// rustls needs a process-wide provider before redis-rs builds a TLS config.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Err means another provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn to_fault(e: redis::RedisError) -> BackendError {
    match e.code() {
        Some(code) => BackendError::with_code(code, e.to_string()),
        None => BackendError::new(e.to_string()),
    }
}
