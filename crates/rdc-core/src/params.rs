//! Connection parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_TIMEOUT: f64 = 5.0;

/// Credentials sent with `AUTH`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Auth {
    /// Legacy `requirepass` secret.
    Password(String),
    /// Redis 6+ ACL user.
    UserPassword { username: String, password: String },
}

impl Auth {
    /// An empty legacy password means "no auth".
    pub fn is_empty(&self) -> bool {
        matches!(self, Auth::Password(secret) if secret.is_empty())
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Password(_) => f.write_str("Password(***)"),
            Auth::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Fully resolved parameters for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: u32,
    /// Connect timeout in seconds.
    pub timeout: f64,
    /// Read/write timeout in seconds; `0.0` means none.
    pub read_write_timeout: f64,
    pub persistent: bool,
    pub auth: Option<Auth>,
    pub prefix: Option<String>,
    pub ssl: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: 0,
            timeout: DEFAULT_TIMEOUT,
            read_write_timeout: 0.0,
            persistent: false,
            auth: None,
            prefix: None,
            ssl: false,
        }
    }
}

impl ConnectionParams {
    /// Overlay every field the partial set carries.
    pub fn merge(&mut self, partial: PartialParams) {
        if let Some(host) = partial.host {
            self.host = host;
        }
        if let Some(port) = partial.port {
            self.port = port;
        }
        if let Some(database) = partial.database {
            self.database = database;
        }
        if let Some(timeout) = partial.timeout {
            self.timeout = timeout;
        }
        if let Some(read_write_timeout) = partial.read_write_timeout {
            self.read_write_timeout = read_write_timeout;
        }
        if let Some(persistent) = partial.persistent {
            self.persistent = persistent;
        }
        if let Some(auth) = partial.auth {
            self.auth = Some(auth);
        }
        if let Some(prefix) = partial.prefix {
            self.prefix = Some(prefix);
        }
        if let Some(ssl) = partial.ssl {
            self.ssl = ssl;
        }
    }

    /// Connect timeout, `None` when unbounded.
    pub fn connect_timeout(&self) -> Option<Duration> {
        seconds(self.timeout)
    }

    /// Read/write timeout, `None` when unbounded.
    pub fn response_timeout(&self) -> Option<Duration> {
        seconds(self.read_write_timeout)
    }

    /// Non-empty key prefix, if any.
    pub fn key_prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| !p.is_empty())
    }
}

fn seconds(value: f64) -> Option<Duration> {
    if value.is_finite() && value > 0.0 {
        Some(Duration::from_secs_f64(value))
    } else {
        None
    }
}

/// Parameters recovered from a URL; unset fields fall back to lower layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<u32>,
    pub timeout: Option<f64>,
    pub read_write_timeout: Option<f64>,
    pub persistent: Option<bool>,
    pub auth: Option<Auth>,
    pub prefix: Option<String>,
    pub ssl: Option<bool>,
}

/// Boolean parse shared by URL query values and env overrides.
///
/// `true`, `1`, `yes` and `on` (any case) are true; everything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
