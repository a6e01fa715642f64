use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum CapacityPolicy {
    /// refuse clients beyond the table's capacity
    #[default]
    Reject,
    /// Make room by removing the least recently active client that has no call executing.
    ///  That client's deduplication state is lost: a late retransmission of its last call
    ///  would be executed again, so this trades the at-most-once guarantee for availability.
    EvictIdle,
}

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum CallTableError {
    #[error("call table is full ({capacity} clients)")]
    TooManyClients { capacity: usize },
    #[error("client {0} already has a call table entry")]
    DuplicateClient(i32),
}

/// The mutable part of a call table entry, guarded by the entry's lock
#[derive(Debug)]
pub struct EntryState {
    /// sequence number of the most recently admitted call, only ever increases
    pub last_sequence_number: i32,
    /// true iff `result` holds the result of the call with `last_sequence_number`
    pub completed: bool,
    pub result: i32,
    /// a worker for this client is in flight
    pub executing: bool,
    pub last_activity: Instant,
}

pub struct CallTableEntry {
    client_id: i32,
    state: Mutex<EntryState>,
}
impl Debug for CallTableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallTableEntry{{client_id:{}}}", self.client_id)
    }
}
impl CallTableEntry {
    fn new(client_id: i32) -> CallTableEntry {
        CallTableEntry {
            client_id,
            state: Mutex::new(EntryState {
                last_sequence_number: 0,
                completed: false,
                result: 0,
                executing: false,
                last_activity: Instant::now(),
            }),
        }
    }

    pub fn client_id(&self) -> i32 {
        self.client_id
    }

    pub async fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().await
    }
}


/// The server's record of the most recent call per client.
///
/// Locking is two-level: the map itself is only locked for looking up and adding entries, and
///  each entry has its own lock for its state. Requests from different clients never contend
///  on an entry lock. The lock order is table before entry.
pub struct CallTable {
    capacity: usize,
    policy: CapacityPolicy,
    entries: RwLock<FxHashMap<i32, Arc<CallTableEntry>>>,
}
impl CallTable {
    pub fn new(capacity: usize, policy: CapacityPolicy) -> CallTable {
        CallTable {
            capacity,
            policy,
            entries: Default::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn find(&self, client_id: i32) -> Option<Arc<CallTableEntry>> {
        self.entries.read().await
            .get(&client_id)
            .cloned()
    }

    /// Adds a fresh entry for a client that has none yet
    pub async fn insert(&self, client_id: i32) -> Result<Arc<CallTableEntry>, CallTableError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&client_id) {
            return Err(CallTableError::DuplicateClient(client_id));
        }
        self.do_insert(&mut entries, client_id)
    }

    pub async fn find_or_insert(&self, client_id: i32) -> Result<Arc<CallTableEntry>, CallTableError> {
        // trying with a read lock first is an optimization for the common case
        if let Some(entry) = self.find(client_id).await {
            return Ok(entry);
        }

        let mut entries = self.entries.write().await;
        // we need to check again now that we have the exclusive lock to avoid racy initialization
        if let Some(entry) = entries.get(&client_id) {
            return Ok(entry.clone());
        }
        self.do_insert(&mut entries, client_id)
    }

    fn do_insert(&self, entries: &mut FxHashMap<i32, Arc<CallTableEntry>>, client_id: i32) -> Result<Arc<CallTableEntry>, CallTableError> {
        if entries.len() >= self.capacity {
            let evicted = match self.policy {
                CapacityPolicy::Reject => false,
                CapacityPolicy::EvictIdle => Self::evict_idle(entries),
            };
            if !evicted {
                return Err(CallTableError::TooManyClients { capacity: self.capacity });
            }
        }

        debug!(client_id, "new call table entry");
        let entry = Arc::new(CallTableEntry::new(client_id));
        entries.insert(client_id, entry.clone());
        Ok(entry)
    }

    /// Removes the least recently active entry without a call in flight. Entries whose lock is
    ///  currently held are busy by definition and skipped.
    fn evict_idle(entries: &mut FxHashMap<i32, Arc<CallTableEntry>>) -> bool {
        let victim = entries.iter()
            .filter_map(|(&client_id, entry)| {
                let state = entry.state.try_lock().ok()?;
                if state.executing {
                    return None;
                }
                Some((state.last_activity, client_id))
            })
            .min();

        match victim {
            Some((_, client_id)) => {
                info!(client_id, "call table is full - evicting least recently active client");
                entries.remove(&client_id);
                true
            }
            None => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::*;

    #[tokio::test]
    async fn test_find_insert() {
        let table = CallTable::new(10, CapacityPolicy::Reject);
        assert!(table.find(42).await.is_none());

        let entry = table.insert(42).await.unwrap();
        assert_eq!(entry.client_id(), 42);
        {
            let state = entry.lock().await;
            assert_eq!(state.last_sequence_number, 0);
            assert!(!state.completed);
            assert!(!state.executing);
        }

        let found = table.find(42).await.unwrap();
        assert!(Arc::ptr_eq(&entry, &found));
        assert_eq!(table.insert(42).await.unwrap_err(), CallTableError::DuplicateClient(42));
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_or_insert_returns_existing_entry() {
        let table = CallTable::new(10, CapacityPolicy::Reject);
        let first = table.find_or_insert(1).await.unwrap();
        first.lock().await.last_sequence_number = 5;

        let second = table.find_or_insert(1).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.last_sequence_number, 5);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_reject_when_full() {
        let table = CallTable::new(2, CapacityPolicy::Reject);
        table.find_or_insert(1).await.unwrap();
        table.find_or_insert(2).await.unwrap();

        assert_eq!(table.find_or_insert(3).await.unwrap_err(), CallTableError::TooManyClients { capacity: 2 });
        assert!(table.find_or_insert(1).await.is_ok());
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_least_recently_active() {
        let table = CallTable::new(2, CapacityPolicy::EvictIdle);
        let first = table.find_or_insert(1).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        table.find_or_insert(2).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        first.lock().await.last_activity = Instant::now();

        table.find_or_insert(3).await.unwrap();

        assert!(table.find(1).await.is_some());
        assert!(table.find(2).await.is_none());
        assert!(table.find(3).await.is_some());
    }

    #[tokio::test]
    async fn test_no_eviction_of_executing_clients() {
        let table = CallTable::new(2, CapacityPolicy::EvictIdle);
        let first = table.find_or_insert(1).await.unwrap();
        let second = table.find_or_insert(2).await.unwrap();
        first.lock().await.executing = true;
        second.lock().await.executing = true;

        assert_eq!(table.find_or_insert(3).await.unwrap_err(), CallTableError::TooManyClients { capacity: 2 });

        second.lock().await.executing = false;
        assert!(table.find_or_insert(3).await.is_ok());
        assert!(table.find(1).await.is_some());
        assert!(table.find(2).await.is_none());
    }

    #[tokio::test]
    async fn test_no_eviction_of_locked_entries() {
        let table = CallTable::new(1, CapacityPolicy::EvictIdle);
        let entry = table.find_or_insert(1).await.unwrap();

        let guard = entry.lock().await;
        assert!(table.find_or_insert(2).await.is_err());
        drop(guard);

        assert!(table.find_or_insert(2).await.is_ok());
    }
}
