use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use redis::{Client, RedisError};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub const PROCESSOR_LOCK_KEY: &str = "notifications:processor:lock";

// Deletes the key only while it still holds our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Proof of holding the processor lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mutual exclusion between processor runs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RunLock: Send + Sync {
    /// `None` when another run currently holds the lock.
    async fn try_acquire(&self) -> Result<Option<LockToken>, RedisError>;

    /// Returns false when the lock had already expired or changed hands.
    async fn release(&self, token: LockToken) -> Result<bool, RedisError>;

    fn ttl(&self) -> Duration;
}

/// Redis lock that keeps two processor runs from working the same batch.
///
/// The TTL bounds how long a crashed holder can block later runs. It should
/// cover the longest run the processor can take, otherwise a slow run loses
/// the lock midway and a second run may start on the same events.
#[derive(Debug, Clone)]
pub struct ProcessorLock {
    client: Client,
    key: String,
    ttl: Duration,
}

impl ProcessorLock {
    pub fn new(client: Client, ttl: Duration) -> Self {
        // Connection validation will happen on first use
        Self {
            client,
            key: PROCESSOR_LOCK_KEY.to_string(),
            ttl,
        }
    }
}

#[async_trait]
impl RunLock for ProcessorLock {
    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn try_acquire(&self) -> Result<Option<LockToken>, RedisError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let token = LockToken::generate();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut connection)
            .await?;

        if reply.is_some() {
            debug!("Acquired processor lock {}", self.key);
            Ok(Some(token))
        } else {
            info!("Processor lock {} is held by another run", self.key);
            Ok(None)
        }
    }

    async fn release(&self, token: LockToken) -> Result<bool, RedisError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let removed: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(token.as_str())
            .invoke_async(&mut connection)
            .await?;

        Ok(removed == 1)
    }
}
