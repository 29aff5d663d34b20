//! Programmatic channel declarations.
//!
//! Consumers declare which channels they need up front; the declarations
//! can then be validated and connected in one pass.

use crate::backend::Backend;
use crate::factory::DedicatedConnectionFactory;
use rdc_core::{Channel, ConnectionResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Id under which a channel's connection is exposed, e.g. `redis.cache_connection`.
pub fn connection_id(channel: &str) -> String {
    format!("redis.{}_connection", channel)
}

/// Which consumers want which channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelBindings {
    bindings: Vec<(String, Channel)>,
}

impl ChannelBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `consumer` needs a connection on `channel`.
    pub fn bind(mut self, consumer: impl Into<String>, channel: &str) -> ConnectionResult<Self> {
        let channel = Channel::new(channel)?;
        self.bindings.push((consumer.into(), channel));
        Ok(self)
    }

    /// Declare several channels for one consumer.
    pub fn bind_many<'a>(
        mut self,
        consumer: impl Into<String>,
        channels: impl IntoIterator<Item = &'a str>,
    ) -> ConnectionResult<Self> {
        let consumer = consumer.into();
        for channel in channels {
            self = self.bind(consumer.clone(), channel)?;
        }
        Ok(self)
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.bindings.iter().any(|(_, c)| c.as_str() == channel)
    }

    /// Declared channels without duplicates, in declaration order.
    pub fn channels(&self) -> Vec<&Channel> {
        let mut seen = Vec::new();
        for (_, channel) in &self.bindings {
            if !seen.contains(&channel) {
                seen.push(channel);
            }
        }
        seen
    }

    pub fn channels_for(&self, consumer: &str) -> Vec<&Channel> {
        self.bindings
            .iter()
            .filter(|(c, _)| c == consumer)
            .map(|(_, channel)| channel)
            .collect()
    }

    /// Establish every declared channel in the factory's current context.
    ///
    /// Stops at the first failure; connections made before it stay cached.
    pub async fn connect_all<B: Backend>(
        &self,
        factory: &DedicatedConnectionFactory<B>,
    ) -> ConnectionResult<HashMap<String, Arc<B::Connection>>> {
        let mut connections = HashMap::new();
        for channel in self.channels() {
            let conn = factory.create_connection(channel.as_str()).await?;
            connections.insert(channel.to_string(), conn);
        }
        Ok(connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use rdc_core::{ConnectionError, GlobalContext, MapSource, ParamsBuilder};

    #[test]
    fn test_connection_id() {
        assert_eq!(connection_id("cache"), "redis.cache_connection");
    }

    #[test]
    fn test_bindings() {
        let bindings = ChannelBindings::new()
            .bind("session_store", "session")
            .unwrap()
            .bind_many("cache_warmer", ["cache", "session"])
            .unwrap();

        assert!(bindings.has_channel("cache"));
        assert!(!bindings.has_channel("queue"));

        let channels: Vec<&str> = bindings.channels().iter().map(|c| c.as_str()).collect();
        assert_eq!(channels, vec!["session", "cache"]);

        let warmer: Vec<&str> = bindings
            .channels_for("cache_warmer")
            .iter()
            .map(|c| c.as_str())
            .collect();
        assert_eq!(warmer, vec!["cache", "session"]);
    }

    #[test]
    fn test_rejects_empty_channel() {
        let err = ChannelBindings::new().bind("svc", "").unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidChannel(_)));
    }

    #[tokio::test]
    async fn test_connect_all() {
        let backend = MockBackend::new();
        let factory = DedicatedConnectionFactory::new(
            backend.clone(),
            Arc::new(GlobalContext),
            ParamsBuilder::new(Arc::new(MapSource::new())),
        );
        let bindings = ChannelBindings::new()
            .bind_many("worker", ["cache", "queue"])
            .unwrap()
            .bind("api", "cache")
            .unwrap();

        let connections = bindings.connect_all(&factory).await.unwrap();
        assert_eq!(connections.len(), 2);
        assert_eq!(backend.connect_attempts(), 2);
        assert!(Arc::ptr_eq(
            &connections["cache"],
            &factory.create_connection("cache").await.unwrap()
        ));
    }

    #[tokio::test]
    async fn test_connect_all_stops_at_first_error() {
        let backend = MockBackend::new();
        backend.script(|s| s.connect = Ok(false));
        let factory = DedicatedConnectionFactory::new(
            backend.clone(),
            Arc::new(GlobalContext),
            ParamsBuilder::new(Arc::new(MapSource::new())),
        );
        let bindings = ChannelBindings::new()
            .bind_many("worker", ["cache", "queue"])
            .unwrap();

        assert!(bindings.connect_all(&factory).await.is_err());
        assert_eq!(backend.connect_attempts(), 1);
    }
}
