//! Dedicated connection factory.
//!
//! Keeps at most one live connection per (context, channel) pair. With an
//! isolating [`ContextService`] the key is `"<context id>:<channel>"` and
//! the connection is closed when the context ends; without isolation the
//! key is the bare channel name and connections live until closed.

use crate::backend::{Backend, BackendConnection};
use crate::connector::Connector;
use rdc_core::{Channel, ConnectionError, ConnectionResult, ContextService, ParamsBuilder};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Cache key of one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    /// `context:channel` when isolated, the bare channel otherwise.
    pub fn new(context_id: Option<&str>, channel: &Channel) -> Self {
        match context_id {
            Some(id) => Self(format!("{}:{}", id, channel)),
            None => Self(channel.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key lives in the given context's namespace.
    pub fn belongs_to(&self, context_id: &str) -> bool {
        self.0
            .strip_prefix(context_id)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Empty until the connection is established; shared by concurrent callers.
type Slot<C> = Arc<OnceCell<Arc<C>>>;

struct Registry<C> {
    slots: Mutex<HashMap<ConnectionKey, Slot<C>>>,
}

impl<C: BackendConnection> Registry<C> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionKey, Slot<C>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, key: &ConnectionKey) -> Slot<C> {
        self.lock().entry(key.clone()).or_default().clone()
    }

    fn holds(&self, key: &ConnectionKey, slot: &Slot<C>) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Drop `slot` after a failed attempt unless it was filled, replaced,
    /// or another caller is still waiting on it.
    fn discard_failed(&self, key: &ConnectionKey, slot: &Slot<C>) {
        let mut slots = self.lock();
        let abandoned = slots.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && current.get().is_none() && Arc::strong_count(current) <= 2
        });
        if abandoned {
            slots.remove(key);
        }
    }

    fn snapshot(&self) -> HashMap<String, Arc<C>> {
        self.lock()
            .iter()
            .filter_map(|(key, slot)| slot.get().map(|conn| (key.0.clone(), conn.clone())))
            .collect()
    }

    /// Evict every key matching `predicate`, then close what was live.
    fn close_where(&self, predicate: impl Fn(&ConnectionKey) -> bool) -> usize {
        let evicted: Vec<(ConnectionKey, Slot<C>)> = {
            let mut slots = self.lock();
            let keys: Vec<ConnectionKey> = slots.keys().filter(|k| predicate(k)).cloned().collect();
            keys.into_iter()
                .filter_map(|key| slots.remove(&key).map(|slot| (key, slot)))
                .collect()
        };

        let mut closed = 0;
        for (key, slot) in evicted {
            if let Some(conn) = slot.get() {
                debug!(key = %key, "Closing dedicated Redis connection");
                conn.close();
                closed += 1;
            }
        }
        closed
    }
}

/// Creates and caches dedicated connections per channel and context.
///
/// Cloning is cheap; clones share the same registry. Use
/// [`with_context`](Self::with_context) to serve another context from the
/// same registry.
pub struct DedicatedConnectionFactory<B: Backend> {
    backend: Arc<B>,
    context: Arc<dyn ContextService>,
    params: ParamsBuilder,
    connector: Connector,
    registry: Arc<Registry<B::Connection>>,
}

impl<B: Backend> Clone for DedicatedConnectionFactory<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            context: self.context.clone(),
            params: self.params.clone(),
            connector: self.connector,
            registry: self.registry.clone(),
        }
    }
}

impl<B: Backend> DedicatedConnectionFactory<B> {
    pub fn new(backend: B, context: Arc<dyn ContextService>, params: ParamsBuilder) -> Self {
        Self {
            backend: Arc::new(backend),
            context,
            params,
            connector: Connector::new(),
            registry: Arc::new(Registry::new()),
        }
    }

    /// Replace the connector used for new connections.
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    /// A view of the same registry bound to another context.
    pub fn with_context(&self, context: Arc<dyn ContextService>) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }

    pub fn params_builder(&self) -> &ParamsBuilder {
        &self.params
    }

    fn isolated(&self) -> bool {
        self.context.supports_concurrent_contexts()
    }

    /// Key for `channel` in the current context.
    pub fn connection_key(&self, channel: &Channel) -> ConnectionKey {
        if self.isolated() {
            ConnectionKey::new(Some(&self.context.current_context_id()), channel)
        } else {
            ConnectionKey::new(None, channel)
        }
    }

    /// Get the current context's connection for `channel`, creating it on
    /// first use.
    ///
    /// A failed attempt leaves nothing behind; the next call starts over.
    pub async fn create_connection(&self, channel: &str) -> ConnectionResult<Arc<B::Connection>> {
        let channel = Channel::new(channel)?;
        let key = self.connection_key(&channel);
        let slot = self.registry.slot(&key);

        if let Some(conn) = slot.get() {
            return Ok(conn.clone());
        }

        let created = AtomicBool::new(false);
        let conn = match slot
            .get_or_try_init(|| async {
                created.store(true, Ordering::Relaxed);
                self.establish(&channel).await
            })
            .await
        {
            Ok(conn) => conn.clone(),
            Err(e) => {
                self.registry.discard_failed(&key, &slot);
                return Err(e);
            }
        };

        if !self.registry.holds(&key, &slot) {
            warn!(key = %key, "Context closed while its connection was being established");
            conn.close();
            return Err(ConnectionError::ConnectionCreation {
                channel: channel.to_string(),
            });
        }

        if created.load(Ordering::Relaxed) {
            self.register_cleanup(key.clone());

            // A context that already ended runs the cleanup on registration.
            if !self.registry.holds(&key, &slot) {
                warn!(key = %key, "Connection requested after its context ended");
                return Err(ConnectionError::ConnectionCreation {
                    channel: channel.to_string(),
                });
            }
        }

        Ok(conn)
    }

    async fn establish(&self, channel: &Channel) -> ConnectionResult<Arc<B::Connection>> {
        let params = self.params.build_params(channel)?;

        debug!(
            channel = %channel,
            context = %self.context.current_context_id(),
            "Creating dedicated Redis connection"
        );

        let conn = self.backend.open();
        match self.connector.connect(&conn, &params).await {
            Ok(true) => Ok(Arc::new(conn)),
            Ok(false) => {
                conn.close();
                warn!(channel = %channel, "Failed to create dedicated Redis connection");
                Err(ConnectionError::ConnectionCreation {
                    channel: channel.to_string(),
                })
            }
            Err(fault) => {
                conn.close();
                let env_key = self.params.build_env_key(channel);
                warn!(channel = %channel, env_key = %env_key, error = %fault, "Redis authentication failed");
                Err(ConnectionError::Authentication {
                    env_key,
                    source: fault,
                })
            }
        }
    }

    fn register_cleanup(&self, key: ConnectionKey) {
        if !self.isolated() {
            return;
        }

        let registry: Weak<Registry<B::Connection>> = Arc::downgrade(&self.registry);
        self.context.on_context_end(Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.close_where(|k| *k == key);
            }
        }));
    }

    /// Copy of every live connection by key.
    pub fn get_connections(&self) -> HashMap<String, Arc<B::Connection>> {
        self.registry.snapshot()
    }

    /// Close every connection, or only those of `context_id`.
    pub fn close_all(&self, context_id: Option<&str>) {
        let closed = match context_id {
            None => self.registry.close_where(|_| true),
            Some(id) => self.registry.close_where(|key| key.belongs_to(id)),
        };
        debug!(context = ?context_id, closed, "Closed dedicated Redis connections");
    }

    /// Close the current context's connections; everything when contexts
    /// are not isolated.
    pub fn close_current_context(&self) {
        if self.isolated() {
            self.close_all(Some(&self.context.current_context_id()));
        } else {
            self.close_all(None);
        }
    }

    /// Close the current context's connection for one channel.
    ///
    /// Returns whether a live connection was closed.
    pub fn close_channel(&self, channel: &str) -> ConnectionResult<bool> {
        let channel = Channel::new(channel)?;
        let key = self.connection_key(&channel);
        Ok(self.registry.close_where(|k| *k == key) > 0)
    }
}
