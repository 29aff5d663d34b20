//! RDC Connection Factory
//!
//! Creates, caches and tears down one dedicated backend connection per
//! (context, channel) pair.

pub mod backend;
pub mod bindings;
pub mod connector;
pub mod factory;

#[cfg(test)]
mod mock;

pub use backend::{Backend, BackendConnection, BackendResult, Endpoint, Serializer};
pub use bindings::{connection_id, ChannelBindings};
pub use connector::Connector;
pub use factory::{ConnectionKey, DedicatedConnectionFactory};
