use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::trace;

/// The storage the server's operations run against. Implementations are shared by all
///  concurrently executing calls and must do their own synchronization.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// the value stored for `key`, 0 if there is none
    async fn get(&self, key: i32) -> i32;

    /// stores `value` for `key`, returning the store's acknowledgement value
    async fn put(&self, key: i32, value: i32) -> i32;

    /// does nothing for the given number of seconds
    async fn idle(&self, seconds: i32);
}

#[derive(Default)]
pub struct InMemoryStore {
    values: RwLock<FxHashMap<i32, i32>>,
}
impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        Default::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: i32) -> i32 {
        self.values.read().await
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    /// returns the value that was written
    async fn put(&self, key: i32, value: i32) -> i32 {
        trace!("storing {} -> {}", key, value);
        self.values.write().await
            .insert(key, value);
        value
    }

    async fn idle(&self, seconds: i32) {
        if seconds > 0 {
            tokio::time::sleep(Duration::from_secs(seconds as u64)).await;
        }
    }
}
