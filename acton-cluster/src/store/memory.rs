/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use static_assertions::assert_impl_all;

use crate::common::StoreError;
use crate::traits::KeyValueStore;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// In-process [`KeyValueStore`] with atomic `set_if_absent` and TTLs.
///
/// Clones share the same entries, so one store can back every node of a
/// [`LocalCluster`](crate::prelude::LocalCluster).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().is_live(now)).count()
    }

    /// Whether the store holds no live key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|entry| {
                let stored = entry.value();
                stored.is_live(now).then(|| stored.value.clone())
            });
        match found {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| !entry.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(StoredValue::new(value, ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, ttl));
                Ok(true)
            }
        }
    }
}

assert_impl_all!(MemoryStore: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_only_succeeds_once() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "a".into(), None).await?);
        assert!(!store.set_if_absent("k", "b".into(), None).await?);
        assert_eq!(store.get("k").await?, Some("a".to_string()));

        assert!(store.delete("k").await?);
        assert!(!store.delete("k").await?);
        assert!(store.set_if_absent("k", "c".into(), None).await?);
        Ok(())
    }

    #[tokio::test]
    async fn expired_keys_read_as_absent() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store
            .set("lease", "holder".into(), Some(Duration::from_millis(20)))
            .await?;
        assert!(store.exists("lease").await?);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.exists("lease").await?);
        assert!(store.set_if_absent("lease", "next".into(), None).await?);
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_set_if_absent_has_one_winner() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let attempts = (0..32).map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.set_if_absent("race", i.to_string(), None).await })
        });
        let mut winners = 0;
        for attempt in futures::future::join_all(attempts).await {
            if attempt?? {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        Ok(())
    }
}
