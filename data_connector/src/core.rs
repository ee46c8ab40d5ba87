// core.rs
//
// Core trait for the shared key-value store used to hand events and task
// state between the render workers and the SSE-terminating API workers.
// One trait, two implementations (redis.rs, memory.rs) — see lib.rs.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shared store unavailable: {0}")]
    Unavailable(String),
    #[error("shared store returned malformed data: {0}")]
    Malformed(String),
}

/// The set of primitives callers need from the shared store: hash
/// set/get/keys/len/exists/delete, list push/trim/range, key TTL,
/// publish/subscribe on one channel, and scan-with-match.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn hash_set(&self, key: &str, field: &str, value: String) -> StoreResult<()>;

    /// Set several fields atomically. Callers must never offer null-valued
    /// fields — the store rejects them.
    async fn hash_set_multi(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()>;

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn hash_keys(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn hash_len(&self, key: &str) -> StoreResult<u64>;

    async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool>;

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<()>;

    async fn hash_delete_key(&self, key: &str) -> StoreResult<()>;

    /// Push a value onto the head of a list (LPUSH semantics: index 0 is
    /// the most recently pushed element).
    async fn list_push_front(&self, key: &str, value: String) -> StoreResult<()>;

    /// Trim a list to `[start, stop]` inclusive (LTRIM semantics).
    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()>;

    /// Read a list range `[start, stop]` inclusive, head-first.
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    async fn list_delete(&self, key: &str) -> StoreResult<()>;

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<()>;

    /// Remaining TTL in seconds, `None` if the key has no expiry or does
    /// not exist.
    async fn ttl(&self, key: &str) -> StoreResult<Option<i64>>;

    async fn publish(&self, channel: &str, message: String) -> StoreResult<()>;

    /// Subscribe to a channel; the returned stream yields raw message
    /// payloads until the subscription is dropped or the connection is
    /// lost. Callers wrap this in a supervised reconnect loop.
    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>>;

    /// Cursor-based key enumeration matching a glob pattern. Never a full
    /// keyspace scan.
    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>>;
}
