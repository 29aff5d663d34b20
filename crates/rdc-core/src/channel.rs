//! Channel names.

use crate::error::{ConnectionError, ConnectionResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named logical connection group (`cache`, `session`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel(String);

impl Channel {
    /// The channel that falls back to the global `REDIS_URL`.
    pub const DEFAULT: &'static str = "default";

    /// Validate and wrap a channel name.
    pub fn new(name: impl Into<String>) -> ConnectionResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConnectionError::invalid_channel(
                "channel name must not be empty",
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }

    /// Prefix used for this channel's environment variables.
    pub fn env_prefix(&self) -> String {
        self.0.to_uppercase()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Channel {
    type Error = ConnectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Channel {
    type Error = ConnectionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_names() {
        assert!(matches!(
            Channel::new(""),
            Err(ConnectionError::InvalidChannel(_))
        ));
        assert!(Channel::new("   ").is_err());
    }

    #[test]
    fn test_env_prefix_is_uppercased() {
        let channel = Channel::new("session-store").unwrap();
        assert_eq!(channel.env_prefix(), "SESSION-STORE");
        assert_eq!(channel.as_str(), "session-store");
    }

    #[test]
    fn test_default_channel() {
        assert!(Channel::new("default").unwrap().is_default());
        assert!(!Channel::new("cache").unwrap().is_default());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Channel = serde_json::from_str("\"queue\"").unwrap();
        assert_eq!(ok.as_str(), "queue");
        assert!(serde_json::from_str::<Channel>("\"\"").is_err());
    }
}
