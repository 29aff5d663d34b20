//! RDC Redis Backend
//!
//! redis-rs implementation of the connection factory's backend interface.

pub mod client;
pub mod values;

use rdc_core::{ContextService, ParamsBuilder};
use rdc_factory::DedicatedConnectionFactory;
use std::sync::Arc;

pub use client::{RedisBackend, RedisConnection, RedisError, RedisResult, RedisTransport};

/// Factory producing redis-rs connections.
pub type RedisConnectionFactory = DedicatedConnectionFactory<RedisBackend>;

/// Factory reading channel configuration from the process environment.
pub fn factory_from_env(context: Arc<dyn ContextService>) -> RedisConnectionFactory {
    DedicatedConnectionFactory::new(RedisBackend, context, ParamsBuilder::from_env())
}
