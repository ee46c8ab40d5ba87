//! Redis-backed implementation of [`SharedStore`], built on `deadpool-redis`
//! pooled connections over the `redis` client.

use std::collections::HashMap;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::stream::{BoxStream, StreamExt};
use redis::AsyncCommands;

use crate::config::StoreConfig;
use crate::core::{SharedStore, StoreError, StoreResult};

pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let mut cfg = Config::from_url(config.url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_max));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn redis_err(e: redis::RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn hash_set(&self, key: &str, field: &str, value: String) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(key, field, value).await.map_err(redis_err)
    }

    async fn hash_set_multi(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for (field, value) in &fields {
            pipe.hset(key, field, value);
        }
        pipe.query_async::<()>(&mut conn).await.map_err(redis_err)
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        conn.hget(key, field).await.map_err(redis_err)
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn().await?;
        conn.hgetall(key).await.map_err(redis_err)
    }

    async fn hash_keys(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.hkeys(key).await.map_err(redis_err)
    }

    async fn hash_len(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        conn.hlen(key).await.map_err(redis_err)
    }

    async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        conn.hexists(key, field).await.map_err(redis_err)
    }

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.hdel::<_, _, ()>(key, field).await.map_err(redis_err)
    }

    async fn hash_delete_key(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await.map_err(redis_err)
    }

    async fn list_push_front(&self, key: &str, value: String) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(key, value).await.map_err(redis_err)
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.ltrim::<_, ()>(key, start as i64, stop as i64)
            .await
            .map_err(redis_err)
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.lrange(key, start as isize, stop as isize).await.map_err(redis_err)
    }

    async fn list_delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await.map_err(redis_err)
    }

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.expire::<_, ()>(key, seconds as i64).await.map_err(redis_err)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn().await?;
        let ttl: i64 = conn.ttl(key).await.map_err(redis_err)?;
        Ok(if ttl < 0 { None } else { Some(ttl) })
    }

    async fn publish(&self, channel: &str, message: String) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.publish::<_, _, ()>(channel, message).await.map_err(redis_err)
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>> {
        let manager = self
            .pool
            .manager()
            .redis_connection_info()
            .clone();
        let client = redis::Client::open(manager.addr.to_string()).map_err(redis_err)?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(redis_err)?;
        pubsub.subscribe(channel).await.map_err(redis_err)?;

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() })
            .boxed();
        Ok(stream)
    }

    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut iter: redis::AsyncIter<'_, String> = conn
            .scan_match(pattern)
            .await
            .map_err(redis_err)?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }
}
