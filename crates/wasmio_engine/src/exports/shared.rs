//! State shared between concurrent calls.

use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::RwLock;

static SHARED: Lazy<Arc<SharedCell>> = Lazy::new(|| Arc::new(SharedCell::new(0)));

/// An integer behind an async read/write lock
///
/// Writers are serialized, so `n` concurrent [`SharedCell::add`] calls of
/// `1` always move the value by exactly `n`.
#[derive(Debug, Default)]
pub struct SharedCell {
    value: RwLock<i32>,
}

impl SharedCell {
    /// Create a cell holding `initial`
    #[must_use]
    pub fn new(initial: i32) -> Self {
        Self {
            value: RwLock::new(initial),
        }
    }

    /// Overwrite the value
    pub async fn set(&self, n: i32) {
        *self.value.write().await = n;
    }

    /// Read the value
    pub async fn get(&self) -> i32 {
        *self.value.read().await
    }

    /// Add `n` and return the new value
    pub async fn add(&self, n: i32) -> i32 {
        let mut value = self.value.write().await;
        *value = value.wrapping_add(n);
        *value
    }
}

/// The module's process-wide cell
#[must_use]
pub fn shared() -> Arc<SharedCell> {
    Arc::clone(&SHARED)
}

/// Overwrite the process-wide value
pub async fn set_shared(n: i32) {
    SHARED.set(n).await;
}

/// Read the process-wide value
pub async fn get_shared() -> i32 {
    SHARED.get().await
}

/// Add to the process-wide value
pub async fn add_shared(n: i32) -> i32 {
    SHARED.add(n).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cell = SharedCell::new(0);
        cell.set(7).await;
        assert_eq!(cell.get().await, 7);
        assert_eq!(cell.add(3).await, 10);
    }

    #[tokio::test]
    async fn test_process_wide_cell() {
        set_shared(0).await;
        join_all((0..100).map(|_| add_shared(1))).await;
        assert_eq!(get_shared().await, 100);
        assert_eq!(shared().get().await, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_nothing() {
        let cell = Arc::new(SharedCell::new(0));
        let tasks = (0..100).map(|_| {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move { cell.add(1).await })
        });
        for result in join_all(tasks).await {
            assert!(result.is_ok());
        }
        assert_eq!(cell.get().await, 100);
    }

    proptest! {
        #[test]
        fn prop_no_lost_updates(writers in 1usize..64, step in -8i32..8) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let total = runtime.block_on(async {
                let cell = Arc::new(SharedCell::new(0));
                let tasks = (0..writers).map(|_| {
                    let cell = Arc::clone(&cell);
                    tokio::spawn(async move { cell.add(step).await })
                });
                join_all(tasks).await;
                cell.get().await
            });
            prop_assert_eq!(total, step * writers as i32);
        }
    }
}
