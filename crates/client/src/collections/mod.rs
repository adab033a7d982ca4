//! Local-first collections (cart and favorites).
//!
//! Every mutation updates memory and storage before returning; the matching
//! remote call runs in the background. Remote calls for one collection run in
//! the order they were issued. A failed remote call leaves the local state as
//! is and marks the collection dirty so the next reconciliation pushes it.

mod cart;
mod favorites;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use luxus_core::{CollectionItem, ProductId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use cart::Cart;
pub use favorites::Favorites;

use crate::error::ApiError;
use crate::storage::{self, KeyValueStore, StorageError};

/// Ordered items mirrored to one storage key.
pub struct LocalCollection<T> {
    name: &'static str,
    key: &'static str,
    items: RwLock<Vec<T>>,
    storage: Arc<dyn KeyValueStore>,
    dirty: Arc<AtomicBool>,
    /// Bumped under the write lock by every local change and by
    /// `clear_local`.
    generation: AtomicU64,
    remote: Mutex<RemoteQueue>,
}

#[derive(Default)]
struct RemoteQueue {
    handles: Vec<JoinHandle<()>>,
    /// Completes when the most recently queued remote call finishes.
    tail: Option<oneshot::Receiver<()>>,
}

impl<T> LocalCollection<T>
where
    T: CollectionItem + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// An empty collection stored under `key`. `name` labels log events.
    #[must_use]
    pub fn new(name: &'static str, key: &'static str, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            name,
            key,
            items: RwLock::new(Vec::new()),
            storage,
            dirty: Arc::new(AtomicBool::new(false)),
            generation: AtomicU64::new(0),
            remote: Mutex::new(RemoteQueue::default()),
        }
    }

    /// Replace memory with the persisted items. Unreadable data is dropped.
    ///
    /// # Errors
    ///
    /// Returns the storage backend's error.
    pub async fn load(&self) -> Result<usize, StorageError> {
        let mut items = self.items.write().await;
        *items = match storage::read_json::<Vec<T>>(self.storage.as_ref(), self.key).await {
            Ok(stored) => stored.unwrap_or_default(),
            Err(StorageError::Corrupt { source, .. }) => {
                warn!(collection = self.name, error = %source, "Discarding unreadable collection");
                self.storage.remove(self.key).await?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(items.len())
    }

    pub async fn snapshot(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn contains(&self, id: ProductId) -> bool {
        self.items
            .read()
            .await
            .iter()
            .any(|item| item.product_id() == id)
    }

    pub async fn find(&self, id: ProductId) -> Option<T> {
        self.items
            .read()
            .await
            .iter()
            .find(|item| item.product_id() == id)
            .cloned()
    }

    /// Apply `f` under the write lock; when it reports a change, persist
    /// before releasing the lock.
    ///
    /// `f` returns `(result, changed)`.
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut Vec<T>) -> (R, bool)) -> R {
        let mut items = self.items.write().await;
        let (result, changed) = f(&mut items);
        if changed {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.persist(&items).await;
        }
        result
    }

    /// Current generation; pass it to
    /// [`replace_if_generation`](Self::replace_if_generation) after a fetch.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Replace every item with remote state and mark the collection clean,
    /// unless it was changed or cleared since `generation` was read.
    ///
    /// Returns whether the replacement was applied.
    pub async fn replace_if_generation(&self, generation: u64, replacement: Vec<T>) -> bool {
        let mut items = self.items.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(collection = self.name, "Collection changed during fetch, keeping local items");
            return false;
        }
        *items = replacement;
        self.persist(&items).await;
        self.mark_clean();
        true
    }

    /// Empty memory and storage and abandon queued remote calls.
    pub async fn clear_local(&self) {
        self.abort_remote();
        let mut items = self.items.write().await;
        items.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.storage.remove(self.key).await {
            warn!(collection = self.name, error = %e, "Failed to remove persisted collection");
        }
        self.mark_clean();
    }

    /// Queue a remote call behind any earlier ones without waiting for it.
    ///
    /// Failure is logged and marks the collection dirty.
    pub fn spawn_remote<F>(&self, operation: &'static str, call: F)
    where
        F: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let (done, tail) = oneshot::channel::<()>();
        let mut queue = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = queue.tail.replace(tail);
        let dirty = Arc::clone(&self.dirty);
        let name = self.name;

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                // Err means the previous call finished or was aborted.
                let _ = previous.await;
            }
            match call.await {
                Ok(()) => debug!(collection = name, operation, "Remote call succeeded"),
                Err(e) => {
                    warn!(collection = name, operation, error = %e, "Remote call failed, will retry at next sync");
                    dirty.store(true, Ordering::SeqCst);
                }
            }
            drop(done);
        });

        queue.handles.retain(|handle| !handle.is_finished());
        queue.handles.push(handle);
    }

    /// Wait for every queued remote call to finish.
    pub async fn settle(&self) {
        loop {
            let handles = {
                let mut queue = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut queue.handles)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await
                    && e.is_panic()
                {
                    warn!(collection = self.name, "Remote call panicked");
                    self.mark_dirty();
                }
            }
        }
    }

    /// Whether local changes may be missing remotely.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    fn abort_remote(&self) {
        let mut queue = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in queue.handles.drain(..) {
            handle.abort();
        }
        queue.tail = None;
    }

    /// Persistence failures are logged; memory stays authoritative.
    async fn persist(&self, items: &[T]) {
        if let Err(e) = storage::write_json(self.storage.as_ref(), self.key, &items).await {
            warn!(collection = self.name, error = %e, "Failed to persist collection");
        }
    }
}

impl<T> std::fmt::Debug for LocalCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCollection")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("dirty", &self.dirty.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use luxus_core::FavoriteItem;
    use luxus_core::ProductSnapshot;
    use rust_decimal::Decimal;

    use super::*;
    use crate::storage::MemoryStore;

    fn favorite(id: i32) -> FavoriteItem {
        FavoriteItem::new(ProductSnapshot::new(
            ProductId::new(id),
            format!("Peça {id}"),
            Decimal::from(10),
        ))
    }

    fn collection(storage: Arc<MemoryStore>) -> LocalCollection<FavoriteItem> {
        LocalCollection::new("favorites", "test-favorites", storage)
    }

    #[tokio::test]
    async fn test_mutate_persists_before_returning() {
        let storage = Arc::new(MemoryStore::new());
        let items = collection(storage.clone());
        items
            .mutate(|items| {
                items.push(favorite(1));
                ((), true)
            })
            .await;

        let reloaded = collection(storage);
        assert_eq!(reloaded.load().await.unwrap(), 1);
        assert!(reloaded.contains(ProductId::new(1)).await);
    }

    #[tokio::test]
    async fn test_stale_replacement_is_dropped() {
        let storage = Arc::new(MemoryStore::new());
        let items = collection(storage.clone());

        let before_clear = items.generation();
        items.clear_local().await;
        assert!(!items.replace_if_generation(before_clear, vec![favorite(1)]).await);
        assert!(items.is_empty().await);
        assert!(storage.get("test-favorites").await.unwrap().is_none());

        let before_add = items.generation();
        items
            .mutate(|items| {
                items.push(favorite(2));
                ((), true)
            })
            .await;
        assert!(!items.replace_if_generation(before_add, vec![favorite(1)]).await);
        assert!(items.contains(ProductId::new(2)).await);

        items.mark_dirty();
        let current = items.generation();
        assert!(items.replace_if_generation(current, vec![favorite(1)]).await);
        assert!(items.contains(ProductId::new(1)).await);
        assert!(!items.is_dirty());
    }

    #[tokio::test]
    async fn test_load_discards_corrupt_data() {
        let storage = Arc::new(MemoryStore::new());
        storage.set("test-favorites", "[{".to_string()).await.unwrap();
        let items = collection(storage.clone());
        assert_eq!(items.load().await.unwrap(), 0);
        assert!(storage.get("test-favorites").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_calls_run_in_order() {
        let items = collection(Arc::new(MemoryStore::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        for (i, delay) in [(1, 30), (2, 0), (3, 10)] {
            let log = Arc::clone(&log);
            items.spawn_remote("test", async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().unwrap().push(i);
                Ok(())
            });
        }
        items.settle().await;
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert!(!items.is_dirty());
    }

    #[tokio::test]
    async fn test_failed_remote_call_marks_dirty() {
        let items = collection(Arc::new(MemoryStore::new()));
        items.spawn_remote("test", async { Err(ApiError::NotSignedIn) });
        items.settle().await;
        assert!(items.is_dirty());

        items.clear_local().await;
        assert!(!items.is_dirty());
    }

    #[tokio::test]
    async fn test_clear_local_abandons_queued_calls() {
        let items = collection(Arc::new(MemoryStore::new()));
        items.spawn_remote("slow", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ApiError::NotSignedIn)
        });
        items.clear_local().await;
        items.settle().await;
        assert!(!items.is_dirty());
        assert!(items.is_empty().await);
    }
}
