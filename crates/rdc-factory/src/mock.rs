//! Scriptable in-memory backend for unit tests.

use crate::backend::{Backend, BackendConnection, BackendResult, Endpoint, Serializer};
use async_trait::async_trait;
use rdc_core::{Auth, BackendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies the next handles will give.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub connect: BackendResult<bool>,
    pub authenticate: BackendResult<bool>,
    pub select: BackendResult<bool>,
    pub set_prefix: BackendResult<()>,
    pub connect_delay: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connect: Ok(true),
            authenticate: Ok(true),
            select: Ok(true),
            set_prefix: Ok(()),
            connect_delay: None,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub script: Mutex<Script>,
    pub opened: AtomicUsize,
    pub connect_attempts: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    pub shared: Arc<Shared>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, update: impl FnOnce(&mut Script)) {
        update(&mut self.shared.script.lock().unwrap());
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }
}

impl Backend for MockBackend {
    type Connection = MockConnection;

    fn open(&self) -> MockConnection {
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        MockConnection {
            shared: self.shared.clone(),
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }
}

#[derive(Debug)]
pub(crate) struct MockConnection {
    shared: Arc<Shared>,
    calls: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn script(&self) -> Script {
        self.shared.script.lock().unwrap().clone()
    }

    async fn open_transport(&self, kind: &str, endpoint: &Endpoint) -> BackendResult<bool> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.record(format!("{} {}:{}", kind, endpoint.host, endpoint.port));
        let script = self.script();
        if let Some(delay) = script.connect_delay {
            tokio::time::sleep(delay).await;
        }
        script.connect
    }
}

#[async_trait]
impl BackendConnection for MockConnection {
    async fn connect(&self, endpoint: &Endpoint) -> BackendResult<bool> {
        self.open_transport("connect", endpoint).await
    }

    async fn persistent_connect(&self, endpoint: &Endpoint) -> BackendResult<bool> {
        self.open_transport("persistent_connect", endpoint).await
    }

    async fn authenticate(&self, auth: &Auth) -> BackendResult<bool> {
        match auth {
            Auth::Password(secret) => self.record(format!("auth {}", secret)),
            Auth::UserPassword { username, password } => {
                self.record(format!("auth {} {}", username, password))
            }
        }
        self.script().authenticate
    }

    async fn select(&self, database: u32) -> BackendResult<bool> {
        self.record(format!("select {}", database));
        self.script().select
    }

    fn set_serializer(&self, serializer: Serializer) -> BackendResult<()> {
        self.record(format!("serializer {:?}", serializer));
        Ok(())
    }

    fn set_prefix(&self, prefix: &str) -> BackendResult<()> {
        self.record(format!("prefix {}", prefix));
        self.script().set_prefix
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.record("close".to_string());
        }
    }
}

pub(crate) fn noauth() -> BackendError {
    BackendError::with_code("NOAUTH", "Authentication required.")
}
