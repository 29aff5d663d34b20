//! Typed values stored through a [`RedisConnection`].
//!
//! Keys get the connection's prefix and values go through its serializer:
//! JSON with `Serializer::Json`, plain strings with `Serializer::None`.

use crate::client::{RedisConnection, RedisError, RedisResult};
use rdc_factory::Serializer;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

impl RedisConnection {
    /// Store `value` under `key`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> RedisResult<()> {
        let payload = encode(self.serializer(), value)?;
        let mut conn = self.command()?;
        conn.set::<_, _, ()>(self.prefixed_key(key), payload).await?;
        Ok(())
    }

    /// Store `value` under `key` for `seconds`.
    pub async fn set_ex<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        seconds: u64,
    ) -> RedisResult<()> {
        let payload = encode(self.serializer(), value)?;
        let mut conn = self.command()?;
        conn.set_ex::<_, _, ()>(self.prefixed_key(key), payload, seconds)
            .await?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> RedisResult<Option<T>> {
        let mut conn = self.command()?;
        let payload: Option<String> = conn.get(self.prefixed_key(key)).await?;
        payload
            .map(|raw| decode(self.serializer(), raw))
            .transpose()
    }

    /// Delete `key`; returns whether it existed.
    pub async fn delete(&self, key: &str) -> RedisResult<bool> {
        let mut conn = self.command()?;
        let removed: i64 = conn.del(self.prefixed_key(key)).await?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> RedisResult<bool> {
        let mut conn = self.command()?;
        Ok(conn.exists(self.prefixed_key(key)).await?)
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.command()?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

fn encode<T: Serialize + ?Sized>(serializer: Serializer, value: &T) -> RedisResult<String> {
    match serializer {
        Serializer::Json => Ok(serde_json::to_string(value)?),
        Serializer::None => match serde_json::to_value(value)? {
            serde_json::Value::String(s) => Ok(s),
            other => Err(RedisError::Unsupported(format!(
                "only strings can be stored without a serializer, got {}",
                other
            ))),
        },
    }
}

fn decode<T: DeserializeOwned>(serializer: Serializer, raw: String) -> RedisResult<T> {
    match serializer {
        Serializer::Json => Ok(serde_json::from_str(&raw)?),
        Serializer::None => Ok(serde_json::from_value(serde_json::Value::String(raw))?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdc_factory::BackendConnection;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user_id: u64,
        roles: Vec<String>,
    }

    #[test]
    fn test_json_encoding() {
        let session = Session {
            user_id: 7,
            roles: vec!["admin".to_string()],
        };
        let raw = encode(Serializer::Json, &session).unwrap();
        assert_eq!(raw, r#"{"user_id":7,"roles":["admin"]}"#);
        let back: Session = decode(Serializer::Json, raw).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_plain_strings_without_serializer() {
        assert_eq!(encode(Serializer::None, "hello").unwrap(), "hello");
        let back: String = decode(Serializer::None, "hello".to_string()).unwrap();
        assert_eq!(back, "hello");
    }

    #[test]
    fn test_structured_values_need_serializer() {
        let err = encode(Serializer::None, &42).unwrap_err();
        assert!(matches!(err, RedisError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let conn = RedisConnection::new();
        conn.close();
        assert!(matches!(conn.set("k", "v").await, Err(RedisError::Closed)));
        assert!(matches!(conn.get::<String>("k").await, Err(RedisError::Closed)));
        assert!(matches!(conn.ping().await, Err(RedisError::Closed)));
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at RDC_TEST_REDIS_URL"]
    async fn test_live_round_trip() {
        use rdc_core::{GlobalContext, MapSource, ParamsBuilder};
        use rdc_factory::DedicatedConnectionFactory;
        use std::sync::Arc;

        let url = std::env::var("RDC_TEST_REDIS_URL").expect("RDC_TEST_REDIS_URL is not set");
        let source = MapSource::new()
            .with("TEST_REDIS_URL", url)
            .with("TEST_REDIS_PREFIX", "rdc-test:");
        let factory = DedicatedConnectionFactory::new(
            crate::RedisBackend,
            Arc::new(GlobalContext),
            ParamsBuilder::new(Arc::new(source)),
        );

        let conn = factory.create_connection("test").await.unwrap();
        conn.ping().await.unwrap();

        let session = Session {
            user_id: 1,
            roles: vec![],
        };
        conn.set_ex("session", &session, 30).await.unwrap();
        assert!(conn.exists("session").await.unwrap());
        assert_eq!(conn.get::<Session>("session").await.unwrap(), Some(session));
        assert!(conn.delete("session").await.unwrap());

        factory.close_all(None);
        assert!(!conn.is_connected());
    }
}
