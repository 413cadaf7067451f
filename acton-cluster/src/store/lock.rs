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

//! Client for the per-identity creation lock.
//!
//! The lock is a key whose presence means "a creation attempt for this
//! identity is in flight". It is written with [`KeyValueStore::set_if_absent`]
//! and a TTL, so an attempt that dies without releasing it cannot block the
//! identity forever. Retry policy lives in the supervisor, not here.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, trace};

use crate::common::StoreError;
use crate::store::KeySpace;
use crate::traits::KeyValueStore;

/// Acquire, release and inspect creation locks.
#[derive(Clone)]
pub struct CreationLock {
    store: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    ttl: Option<Duration>,
}

impl fmt::Debug for CreationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationLock")
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CreationLock {
    /// Lock client over `store`; locks expire after `ttl` when one is given.
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeySpace, ttl: Option<Duration>) -> Self {
        Self { store, keys, ttl }
    }

    /// Store key of the lock for `id`.
    pub fn key(&self, id: &str) -> String {
        self.keys.creation_lock(id)
    }

    /// Takes the lock for `id` on behalf of `holder` if nobody holds it.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    #[instrument(skip(self))]
    pub async fn try_acquire(&self, id: &str, holder: &str) -> Result<bool, StoreError> {
        let acquired = self
            .store
            .set_if_absent(&self.key(id), holder.to_string(), self.ttl)
            .await?;
        trace!(acquired, "creation lock attempt");
        Ok(acquired)
    }

    /// Drops the lock for `id`, whoever holds it. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn release(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(&self.key(id)).await.map(|_| ())
    }

    /// Whether somebody holds the lock for `id`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn is_held(&self, id: &str) -> Result<bool, StoreError> {
        self.store.exists(&self.key(id)).await
    }

    /// Who holds the lock for `id`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn holder(&self, id: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&self.key(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn lock(store: &MemoryStore, ttl: Option<Duration>) -> CreationLock {
        CreationLock::new(Arc::new(store.clone()), KeySpace::new("test", "orders"), ttl)
    }

    #[tokio::test]
    async fn second_holder_is_refused_until_release() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let lock = lock(&store, None);

        assert!(lock.try_acquire("42", "node-a").await?);
        assert!(!lock.try_acquire("42", "node-b").await?);
        assert!(lock.is_held("42").await?);
        assert_eq!(lock.holder("42").await?.as_deref(), Some("node-a"));

        lock.release("42").await?;
        lock.release("42").await?;
        assert!(!lock.is_held("42").await?);
        assert!(lock.try_acquire("42", "node-b").await?);
        Ok(())
    }

    #[tokio::test]
    async fn abandoned_lock_expires() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let lock = lock(&store, Some(Duration::from_millis(20)));

        assert!(lock.try_acquire("42", "node-a").await?);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(lock.try_acquire("42", "node-b").await?);
        Ok(())
    }

    #[tokio::test]
    async fn locks_are_per_identity() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let lock = lock(&store, None);
        assert!(lock.try_acquire("1", "node-a").await?);
        assert!(lock.try_acquire("2", "node-a").await?);
        Ok(())
    }
}
