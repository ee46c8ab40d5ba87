//! In-process fake of [`SharedStore`], used by tests and by any binary
//! running without a configured Redis endpoint. Not durable across
//! restarts and not shared across OS processes — only useful as a stand-in
//! for a single-process test harness.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::core::{SharedStore, StoreResult};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
pub struct MemoryStore {
    hashes: DashMap<String, HashMap<String, String>>,
    lists: DashMap<String, VecDeque<String>>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }
    let mut rest = candidate;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn hash_set(&self, key: &str, field: &str, value: String) -> StoreResult<()> {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_set_multi(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        let mut entry = self.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field, value);
        }
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self.hashes.get(key).map(|h| h.clone()).unwrap_or_default())
    }

    async fn hash_keys(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .hashes
            .get(key)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn hash_len(&self, key: &str) -> StoreResult<u64> {
        Ok(self.hashes.get(key).map(|h| h.len() as u64).unwrap_or(0))
    }

    async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self
            .hashes
            .get(key)
            .map(|h| h.contains_key(field))
            .unwrap_or(false))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<()> {
        if let Some(mut h) = self.hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn hash_delete_key(&self, key: &str) -> StoreResult<()> {
        self.hashes.remove(key);
        Ok(())
    }

    async fn list_push_front(&self, key: &str, value: String) -> StoreResult<()> {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_front(value);
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        if let Some(mut list) = self.lists.get_mut(key) {
            let len = list.len() as isize;
            let start = start.max(0).min(len);
            let stop = if stop < 0 { len + stop + 1 } else { (stop + 1).min(len) };
            if start >= stop {
                list.clear();
            } else {
                let trimmed: VecDeque<String> = list
                    .iter()
                    .skip(start as usize)
                    .take((stop - start) as usize)
                    .cloned()
                    .collect();
                *list = trimmed;
            }
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as isize;
        let start = start.max(0).min(len);
        let stop = if stop < 0 { len + stop + 1 } else { (stop + 1).min(len) };
        if start >= stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start) as usize)
            .cloned()
            .collect())
    }

    async fn list_delete(&self, key: &str) -> StoreResult<()> {
        self.lists.remove(key);
        Ok(())
    }

    async fn expire(&self, _key: &str, _seconds: u64) -> StoreResult<()> {
        Ok(())
    }

    async fn ttl(&self, _key: &str) -> StoreResult<Option<i64>> {
        Ok(None)
    }

    async fn publish(&self, channel: &str, message: String) -> StoreResult<()> {
        let _ = self.channel(channel).send(message);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>> {
        let rx = self.channel(channel).subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|item| async move { item.ok() });
        Ok(stream.boxed())
    }

    async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .hashes
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|k| glob_match(pattern, k))
            .collect();
        keys.extend(
            self.lists
                .iter()
                .map(|entry| entry.key().clone())
                .filter(|k| glob_match(pattern, k)),
        );
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

pub fn shared() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_roundtrip() {
        let store = MemoryStore::new();
        store.hash_set("k", "a", "1".into()).await.unwrap();
        store.hash_set("k", "b", "2".into()).await.unwrap();
        assert_eq!(store.hash_get("k", "a").await.unwrap(), Some("1".into()));
        assert_eq!(store.hash_len("k").await.unwrap(), 2);
        store.hash_delete("k", "a").await.unwrap();
        assert_eq!(store.hash_get("k", "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_push_and_trim() {
        let store = MemoryStore::new();
        for v in ["c", "b", "a"] {
            store.list_push_front("q", v.into()).await.unwrap();
        }
        assert_eq!(
            store.list_range("q", 0, -1).await.unwrap(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        store.list_trim("q", 0, 1).await.unwrap();
        assert_eq!(
            store.list_range("q", 0, -1).await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn publish_subscribe_delivers_message() {
        let store = MemoryStore::new();
        let mut stream = store.subscribe("sse_events").await.unwrap();
        store.publish("sse_events", "hello".into()).await.unwrap();
        let msg = stream.next().await;
        assert_eq!(msg, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn scan_match_filters_by_glob() {
        let store = MemoryStore::new();
        store.hash_set("conn:1", "f", "v".into()).await.unwrap();
        store.hash_set("conn:2", "f", "v".into()).await.unwrap();
        store.hash_set("task:1", "f", "v".into()).await.unwrap();
        let mut keys = store.scan_match("conn:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["conn:1".to_string(), "conn:2".to_string()]);
    }
}
