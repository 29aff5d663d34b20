//! Configuration sources.
//!
//! Connection settings are environment-style key/value pairs. The resolver
//! reads them through [`ConfigSource`] so the process environment, a dotenv
//! file or an explicit map can back it.

use crate::error::{ConnectionError, ConnectionResult};
use std::collections::HashMap;
use std::path::Path;

/// Read-only lookup of configuration variables.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// An explicit set of variables.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    vars: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Load a dotenv file without touching the process environment.
    pub fn from_dotenv(path: impl AsRef<Path>) -> ConnectionResult<Self> {
        let path = path.as_ref();
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            ConnectionError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut source = Self::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                ConnectionError::configuration(format!("Failed to parse {}: {}", path.display(), e))
            })?;
            source.insert(key, value);
        }
        tracing::debug!(path = %path.display(), vars = source.vars.len(), "Loaded dotenv source");
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
