//! Redis realtime broadcaster
//!
//! Publishes realtime payloads on Redis pub/sub channels named
//! `<channel_prefix><topic>`. The web tier subscribes and relays them to
//! connected browsers.

use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RedisConfig;
use crate::services::notification::Broadcaster;
use crate::utils::errors::Result;

/// Broadcaster backed by a Redis connection manager
#[derive(Clone)]
pub struct RedisBroadcaster {
    connection_manager: redis::aio::ConnectionManager,
    config: RedisConfig,
}

impl RedisBroadcaster {
    /// Connect to Redis
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection_manager = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self { connection_manager, config })
    }

    /// Full channel name for a topic
    pub fn channel(&self, topic: &str) -> String {
        channel_name(&self.config.channel_prefix, topic)
    }

    /// Health check for Redis connection
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let result: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(response) => {
                debug!(response = %response, "Redis health check successful");
                Ok(response == "PONG")
            }
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                Ok(false)
            }
        }
    }
}

fn channel_name(prefix: &str, topic: &str) -> String {
    format!("{}{}", prefix, topic)
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn emit(&self, topic: &str, payload: Value) -> Result<()> {
        let channel = self.channel(topic);
        let serialized = serde_json::to_string(&payload)?;

        let mut conn = self.connection_manager.clone();
        let receivers: i64 = conn.publish(&channel, serialized).await?;

        debug!(channel = %channel, receivers = receivers, "Realtime payload published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_channel_name_uses_prefix() {
        let settings = Settings::default();
        assert_eq!(channel_name(&settings.redis.channel_prefix, "event:7"), "school_events:event:7");
    }

    #[tokio::test]
    async fn test_redis_broadcaster_creation() {
        let settings = Settings::default();
        let result = RedisBroadcaster::new(settings.redis).await;

        // Fails without a local Redis, which is expected in CI
        match result {
            Ok(broadcaster) => assert_eq!(broadcaster.channel("user:1"), "school_events:user:1"),
            Err(e) => println!("Redis broadcaster creation failed (expected in test env): {}", e),
        }
    }
}
