use async_trait::async_trait;
use kx_common::{KxError, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::store::{Store, Ttl};

/// [`Store`] backed by a Redis server.
pub struct RedisStore {
    client: redis::Client,
    connection: Arc<Mutex<MultiplexedConnection>>,
}

fn store_error(context: &'static str) -> impl FnOnce(redis::RedisError) -> KxError {
    move |err| KxError::Store(format!("{}: {}", context, err))
}

impl RedisStore {
    /// Create new Redis store client
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(store_error("Failed to create Redis client"))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error("Failed to connect to Redis"))?;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Open an independent connection to the same server.
    ///
    /// Each lock manager handle can own its own connection this way.
    pub async fn reconnect(&self) -> Result<Self> {
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error("Failed to connect to Redis"))?;

        Ok(Self {
            client: self.client.clone(),
            connection: Arc::new(Mutex::new(connection)),
        })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.connection.lock().await;
        conn.set_nx::<_, _, bool>(key, value)
            .await
            .map_err(store_error("Failed to SETNX Redis key"))
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.expire::<_, ()>(key, seconds)
            .await
            .map_err(store_error("Failed to set expiration on Redis key"))
    }

    async fn ttl(&self, key: &str) -> Result<Ttl> {
        let mut conn = self.connection.lock().await;
        let reply: i64 = conn.ttl(key).await.map_err(store_error("Failed to read Redis key TTL"))?;
        Ok(Ttl::from_redis_reply(reply))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.lock().await;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(store_error("Failed to get Redis key"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.del::<_, ()>(key)
            .await
            .map_err(store_error("Failed to delete Redis key"))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>> {
        let mut conn = self.connection.lock().await;
        let score: Option<f64> = conn
            .zscore(key, member)
            .await
            .map_err(store_error("Failed to read Redis sorted set score"))?;
        Ok(score.map(|s| s as i64))
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(store_error("Failed to add to Redis sorted set"))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.connection.lock().await;
        conn.zrem::<_, _, ()>(key, member)
            .await
            .map_err(store_error("Failed to remove from Redis sorted set"))
    }

    async fn zrange_withscores(&self, key: &str, start: isize, stop: isize) -> Result<Vec<(String, i64)>> {
        let mut conn = self.connection.lock().await;
        let entries: Vec<(String, f64)> = conn
            .zrange_withscores(key, start, stop)
            .await
            .map_err(store_error("Failed to get Redis sorted set range"))?;
        Ok(entries.into_iter().map(|(member, score)| (member, score as i64)).collect())
    }

    /// Ping Redis to check connection
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.lock().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(store_error("Failed to ping Redis"))?;
        Ok(())
    }
}
