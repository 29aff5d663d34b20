//! RDC Core Library
//!
//! Channel naming, connection parameters and the configuration pipeline
//! (URL parsing and environment layering) for dedicated Redis connections.

pub mod channel;
pub mod context;
pub mod error;
pub mod params;
pub mod resolver;
pub mod source;
pub mod url_parser;

pub use channel::Channel;
pub use context::{ContextCallback, ContextService, GlobalContext, RequestContext, GLOBAL_CONTEXT_ID};
pub use error::{BackendError, ConnectionError, ConnectionResult};
pub use params::{Auth, ConnectionParams, PartialParams};
pub use resolver::ParamsBuilder;
pub use source::{ConfigSource, EnvSource, MapSource};
pub use url_parser::parse_url;
