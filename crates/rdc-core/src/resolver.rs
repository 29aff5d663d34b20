//! Connection parameter resolution.
//!
//! Layers, later wins:
//! 1. built-in defaults
//! 2. `<CHANNEL>_REDIS_URL`, or `REDIS_URL` for the `default` channel when
//!    the channel URL is unset
//! 3. per-field overrides such as `<CHANNEL>_REDIS_HOST`
//!
//! Per-field overrides beat a channel URL even when both are set.

use crate::channel::Channel;
use crate::error::{ConnectionError, ConnectionResult};
use crate::params::{parse_bool, Auth, ConnectionParams};
use crate::source::{ConfigSource, EnvSource};
use crate::url_parser::parse_url;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Global URL consulted by the `default` channel.
pub const GLOBAL_URL_VAR: &str = "REDIS_URL";

/// Fields that can be overridden one by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Host,
    Port,
    Database,
    Auth,
    Timeout,
    ReadWriteTimeout,
    Persistent,
    Prefix,
}

impl Field {
    const ALL: [Field; 8] = [
        Field::Host,
        Field::Port,
        Field::Database,
        Field::Auth,
        Field::Timeout,
        Field::ReadWriteTimeout,
        Field::Persistent,
        Field::Prefix,
    ];

    fn env_suffix(self) -> &'static str {
        match self {
            Field::Host => "REDIS_HOST",
            Field::Port => "REDIS_PORT",
            Field::Database => "REDIS_DB",
            Field::Auth => "REDIS_PASSWORD",
            Field::Timeout => "REDIS_TIMEOUT",
            Field::ReadWriteTimeout => "REDIS_READ_WRITE_TIMEOUT",
            Field::Persistent => "REDIS_PERSISTENT",
            Field::Prefix => "REDIS_PREFIX",
        }
    }
}

/// Builds [`ConnectionParams`] for a channel from a [`ConfigSource`].
#[derive(Clone)]
pub struct ParamsBuilder {
    source: Arc<dyn ConfigSource>,
}

impl ParamsBuilder {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self { source }
    }

    /// Resolver over the process environment.
    pub fn from_env() -> Self {
        Self::new(Arc::new(EnvSource))
    }

    /// Name of the channel's URL variable, e.g. `CACHE_REDIS_URL`.
    pub fn build_env_key(&self, channel: &Channel) -> String {
        format!("{}_REDIS_URL", channel.env_prefix())
    }

    /// Resolve the full parameter set for a channel.
    pub fn build_params(&self, channel: &Channel) -> ConnectionResult<ConnectionParams> {
        let mut params = ConnectionParams::default();
        self.apply_url(&mut params, channel)?;
        self.apply_overrides(&mut params, channel)?;
        Ok(params)
    }

    fn apply_url(&self, params: &mut ConnectionParams, channel: &Channel) -> ConnectionResult<()> {
        let channel_key = self.build_env_key(channel);

        let (var, url) = match self.source.get(&channel_key) {
            Some(url) => (channel_key, url),
            None if channel.is_default() => match self.source.get(GLOBAL_URL_VAR) {
                Some(url) => (GLOBAL_URL_VAR.to_string(), url),
                None => return Ok(()),
            },
            None => return Ok(()),
        };

        debug!(channel = %channel, var = %var, "Applying Redis URL");
        params.merge(parse_url(&url)?);
        Ok(())
    }

    fn apply_overrides(
        &self,
        params: &mut ConnectionParams,
        channel: &Channel,
    ) -> ConnectionResult<()> {
        let prefix = channel.env_prefix();

        for field in Field::ALL {
            let var = format!("{}_{}", prefix, field.env_suffix());
            let Some(value) = self.source.get(&var) else {
                continue;
            };

            match field {
                Field::Host => params.host = value,
                Field::Port => params.port = convert(&var, &value)?,
                Field::Database => params.database = convert(&var, &value)?,
                Field::Auth => params.auth = Some(Auth::Password(value)),
                Field::Timeout => params.timeout = convert(&var, &value)?,
                Field::ReadWriteTimeout => params.read_write_timeout = convert(&var, &value)?,
                Field::Persistent => params.persistent = parse_bool(&value),
                Field::Prefix => params.prefix = Some(value),
            }
        }

        Ok(())
    }
}

fn convert<T: FromStr>(var: &str, value: &str) -> ConnectionResult<T> {
    value.trim().parse().map_err(|_| {
        ConnectionError::configuration(format!("Invalid value for {}: {}", var, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MapSource;

    fn builder(source: MapSource) -> ParamsBuilder {
        ParamsBuilder::new(Arc::new(source))
    }

    fn channel(name: &str) -> Channel {
        Channel::new(name).unwrap()
    }

    #[test]
    fn test_build_env_key() {
        let b = builder(MapSource::new());
        assert_eq!(b.build_env_key(&channel("cache")), "CACHE_REDIS_URL");
        assert_eq!(b.build_env_key(&channel("Session")), "SESSION_REDIS_URL");
        assert_eq!(b.build_env_key(&channel("default")), "DEFAULT_REDIS_URL");
    }

    #[test]
    fn test_defaults_without_configuration() {
        let params = builder(MapSource::new())
            .build_params(&channel("cache"))
            .unwrap();
        assert_eq!(params, ConnectionParams::default());
    }

    #[test]
    fn test_channel_url() {
        let source = MapSource::new().with(
            "CACHE_REDIS_URL",
            "rediss://user:pw@cache.internal:6380/4?prefix=c:",
        );
        let params = builder(source).build_params(&channel("cache")).unwrap();
        assert_eq!(params.host, "cache.internal");
        assert_eq!(params.port, 6380);
        assert_eq!(params.database, 4);
        assert!(params.ssl);
        assert_eq!(params.prefix.as_deref(), Some("c:"));
        assert_eq!(params.timeout, 5.0);
        assert_eq!(
            params.auth,
            Some(Auth::UserPassword {
                username: "user".to_string(),
                password: "pw".to_string(),
            })
        );
    }

    #[test]
    fn test_global_url_only_for_default_channel() {
        let source = MapSource::new().with("REDIS_URL", "redis://global:7000/1");
        let b = builder(source);

        let params = b.build_params(&channel("default")).unwrap();
        assert_eq!(params.host, "global");
        assert_eq!(params.port, 7000);
        assert_eq!(params.database, 1);

        let params = b.build_params(&channel("cache")).unwrap();
        assert_eq!(params, ConnectionParams::default());
    }

    #[test]
    fn test_channel_url_beats_global_url() {
        let source = MapSource::new()
            .with("REDIS_URL", "redis://global:7000")
            .with("DEFAULT_REDIS_URL", "redis://specific:7001");
        let params = builder(source).build_params(&channel("default")).unwrap();
        assert_eq!(params.host, "specific");
        assert_eq!(params.port, 7001);
    }

    #[test]
    fn test_overrides_beat_url() {
        let source = MapSource::new()
            .with("CACHE_REDIS_URL", "redis://:from-url@url-host:1111/2?timeout=1&prefix=url:")
            .with("CACHE_REDIS_HOST", "env-host")
            .with("CACHE_REDIS_PORT", "2222")
            .with("CACHE_REDIS_DB", "9")
            .with("CACHE_REDIS_PASSWORD", "from-env")
            .with("CACHE_REDIS_TIMEOUT", "0.25")
            .with("CACHE_REDIS_READ_WRITE_TIMEOUT", "3")
            .with("CACHE_REDIS_PERSISTENT", "on")
            .with("CACHE_REDIS_PREFIX", "env:");
        let params = builder(source).build_params(&channel("cache")).unwrap();
        assert_eq!(params.host, "env-host");
        assert_eq!(params.port, 2222);
        assert_eq!(params.database, 9);
        assert_eq!(params.auth, Some(Auth::Password("from-env".to_string())));
        assert_eq!(params.timeout, 0.25);
        assert_eq!(params.read_write_timeout, 3.0);
        assert!(params.persistent);
        assert_eq!(params.prefix.as_deref(), Some("env:"));
    }

    #[test]
    fn test_overrides_are_per_channel() {
        let source = MapSource::new()
            .with("CACHE_REDIS_HOST", "cache-host")
            .with("SESSION_REDIS_HOST", "session-host");
        let b = builder(source);
        assert_eq!(b.build_params(&channel("cache")).unwrap().host, "cache-host");
        assert_eq!(b.build_params(&channel("session")).unwrap().host, "session-host");
        assert_eq!(b.build_params(&channel("queue")).unwrap().host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_override_names_variable() {
        let source = MapSource::new().with("CACHE_REDIS_PORT", "not-a-port");
        let err = builder(source).build_params(&channel("cache")).unwrap_err();
        match err {
            ConnectionError::Configuration(msg) => assert!(msg.contains("CACHE_REDIS_PORT")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let source = MapSource::new().with("CACHE_REDIS_URL", "memcached://host");
        assert!(matches!(
            builder(source).build_params(&channel("cache")),
            Err(ConnectionError::Configuration(_))
        ));
    }
}
