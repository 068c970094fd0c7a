//! A single lazily fetched value held only as long as someone uses it.

use std::future::Future;
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;

struct Slot<T> {
    revision: u64,
    value: Weak<T>,
}

/// Weakly cached value, fetched on demand.
///
/// Used for member lists: the list is shared while callers hold it and
/// refetched once every holder has dropped it. Each load is tagged with the
/// revision of the data it was built from; asking for a newer revision
/// refetches even while an older value is still held.
pub struct WeakSlot<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> WeakSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                revision: 0,
                value: Weak::new(),
            }),
        }
    }

    /// The cached value if it is alive and was loaded at `revision`,
    /// otherwise the result of `load`.
    pub async fn get_or_try_load<E, F, Fut>(&self, revision: u64, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        if slot.revision == revision {
            if let Some(value) = slot.value.upgrade() {
                return Ok(value);
            }
        }
        let value = Arc::new(load().await?);
        slot.revision = revision;
        slot.value = Arc::downgrade(&value);
        Ok(value)
    }

    /// The cached value if still alive, whatever its revision.
    pub async fn peek(&self) -> Option<Arc<T>> {
        self.slot.lock().await.value.upgrade()
    }
}

impl<T> Default for WeakSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
