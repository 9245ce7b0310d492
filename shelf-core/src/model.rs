//! Per-connector cache of registered entity models.
//!
//! A connector turns the schema of an entity into a store-specific model (a collection handle
//! with its indexes, an in-memory table with its unique constraints...) the first time the
//! entity is used, and reuses it for the rest of its lifetime.
//!
//! Registration is first-write-wins: once an entity has a model, later calls reuse it even
//! when they carry a different schema.

use mea::{mutex::Mutex, rwlock::RwLock};
use std::{collections::HashMap, fmt, future::Future, sync::Arc};
use tracing::debug;

use crate::error::StoreResult;

/// Registration slot of one entity. Its lock is only contended by first uses of that entity.
type Slot<M> = Arc<Mutex<Option<Arc<M>>>>;

pub struct ModelCache<M> {
    slots: RwLock<HashMap<String, Slot<M>>>,
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self { slots: RwLock::new(HashMap::new()) }
    }

    /// Returns the model registered for `entity`, if any.
    pub async fn get(&self, entity: &str) -> Option<Arc<M>> {
        let slot = self.slots.read().await.get(entity).cloned()?;
        let model = slot.lock().await.clone();

        model
    }

    async fn slot(&self, entity: &str) -> Slot<M> {
        if let Some(slot) = self.slots.read().await.get(entity) {
            return slot.clone();
        }

        self.slots
            .write()
            .await
            .entry(entity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Returns the model of `entity`, registering it with `register` on first use.
    ///
    /// Concurrent first uses of the same entity run `register` exactly once: they queue on
    /// the entity's own slot, so a slow registration never holds up other entities.
    /// A failed registration leaves the entity unregistered so that a later call retries.
    pub async fn get_or_register<F, Fut>(&self, entity: &str, register: F) -> StoreResult<Arc<M>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<M>>,
    {
        let slot = self.slot(entity).await;
        let mut registered = slot.lock().await;

        if let Some(model) = registered.as_ref() {
            return Ok(model.clone());
        }

        let model = Arc::new(register().await?);
        *registered = Some(model.clone());
        debug!(entity, "registered entity model");

        Ok(model)
    }

    /// Number of registered entities.
    pub async fn len(&self) -> usize {
        let slots = self.slots
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();

        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }

        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for ModelCache<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mea::latch::Latch;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test]
    async fn first_registration_wins() {
        let cache = ModelCache::new();

        let first = cache.get_or_register("users", || async { Ok("v1") }).await.unwrap();
        let second = cache.get_or_register("users", || async { Ok("v2") }).await.unwrap();

        assert_eq!(*first, "v1");
        assert_eq!(*second, "v1");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn failed_registration_is_retried() {
        let cache: ModelCache<u8> = ModelCache::new();

        let failed = cache
            .get_or_register("users", || async {
                Err(crate::error::StoreError::Initialization("index creation failed".to_string()))
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.get("users").await.is_none());

        let model = cache.get_or_register("users", || async { Ok(7) }).await.unwrap();
        assert_eq!(*model, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_registers_once() {
        let cache = Arc::new(ModelCache::new());
        let registrations = Arc::new(AtomicUsize::new(0));

        let tasks = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let registrations = registrations.clone();

                tokio::spawn(async move {
                    cache
                        .get_or_register("items", || async move {
                            registrations.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            Ok(())
                        })
                        .await
                        .map(|_| ())
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_registration_does_not_block_other_entities() {
        let cache: Arc<ModelCache<i32>> = Arc::new(ModelCache::new());
        let started = Arc::new(Latch::new(1));
        let release = Arc::new(Latch::new(1));

        let slow = {
            let cache = cache.clone();
            let started = started.clone();
            let release = release.clone();

            tokio::spawn(async move {
                cache
                    .get_or_register("items", || async move {
                        started.count_down();
                        release.wait().await;
                        Ok(1)
                    })
                    .await
                    .map(|model| *model)
            })
        };

        started.wait().await;

        let users = tokio::time::timeout(
            Duration::from_secs(5),
            cache.get_or_register("users", || async { Ok(2) }),
        )
        .await
        .expect("users registration waited on items")
        .unwrap();

        assert_eq!(*users, 2);

        release.count_down();
        assert_eq!(slow.await.unwrap().unwrap(), 1);
        assert_eq!(cache.len().await, 2);
    }
}
