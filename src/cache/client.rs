use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use redis::{aio::ConnectionManager, streams::StreamMaxlen, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::CacheSettings;

/// Async Redis client shared by every cache consumer.
///
/// Wraps a `ConnectionManager` (multiplexed, auto-reconnecting) and applies
/// the configured socket timeout to every operation. The manager is cheap to
/// clone; callers hold one `CacheClient` and clone per task.
#[derive(Clone)]
pub struct CacheClient {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl CacheClient {
    pub async fn connect(settings: &CacheSettings) -> Result<Self> {
        let url = settings.connection_url();
        info!(
            "Connecting to cache: redis://{}:{}/{}",
            settings.host, settings.port, settings.db
        );

        let client = Client::open(url.as_str()).context("Invalid cache URL")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("Failed to establish cache connection")?;

        let cache = Self {
            conn,
            op_timeout: Duration::from_secs(settings.socket_timeout_s),
        };

        cache.ping().await.context("Cache ping failed")?;
        info!("Cache connection established");

        Ok(cache)
    }

    async fn timed<T>(&self, fut: impl std::future::Future<Output = redis::RedisResult<T>>) -> Result<T> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .context("cache operation timed out")?
            .context("cache operation failed")
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let reply: String = self
            .timed(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        anyhow::ensure!(reply == "PONG", "unexpected PING reply: {reply}");
        Ok(())
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<u64>) -> Result<()> {
        let payload = serde_json::to_string(value).context("serialize cache value")?;
        let mut conn = self.conn.clone();
        let key = key.to_string();
        match ttl {
            Some(secs) => {
                self.timed(async move { conn.set_ex(key, payload, secs).await })
                    .await
            }
            None => self.timed(async move { conn.set(key, payload).await }).await,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let raw: Option<String> = self.timed(async move { conn.get(key).await }).await?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s).context("deserialize cache value")?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.timed(async move { conn.del(key).await }).await
    }

    /// Add a member to a sorted set, then trim it to the newest `cap`
    /// entries by rank.
    pub async fn zadd_capped(&self, key: &str, member: String, score: f64, cap: usize) -> Result<()> {
        let mut conn = self.conn.clone();
        let key_owned = key.to_string();
        self.timed::<()>(async move { conn.zadd(key_owned, member, score).await })
            .await?;

        let mut conn = self.conn.clone();
        let key_owned = key.to_string();
        let _removed: i64 = self
            .timed(async move {
                conn.zremrangebyrank(key_owned, 0, -(cap as isize) - 1).await
            })
            .await?;
        Ok(())
    }

    pub async fn zadd(&self, key: &str, member: String, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.timed(async move { conn.zadd(key, member, score).await }).await
    }

    pub async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.timed(async move { conn.zrangebyscore(key, min, max).await })
            .await
    }

    pub async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.timed(async move { conn.zrembyscore(key, min, max).await })
            .await
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = pattern.to_string();
        self.timed(async move { conn.keys(pattern).await }).await
    }

    /// XADD with approximate MAXLEN trimming. Returns the stream entry id.
    pub async fn xadd_capped(
        &self,
        stream: &str,
        max_len: usize,
        fields: &[(&str, String)],
    ) -> Result<String> {
        let mut conn = self.conn.clone();
        let stream = stream.to_string();
        let items: Vec<(String, String)> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.timed(async move {
            conn.xadd_maxlen(stream, StreamMaxlen::Approx(max_len), "*", &items)
                .await
        })
        .await
    }

    pub async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let channel = channel.to_string();
        self.timed(async move { conn.publish(channel, payload).await })
            .await
    }
}
