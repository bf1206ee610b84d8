//! Per-conversation concurrency control.
//!
//! Only one turn runs per conversation at a time. A second request
//! arriving while a turn is in flight is rejected immediately rather than
//! queued - the caller retries after the current turn settles.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct TurnLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for TurnLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Try to acquire the turn lock for a conversation. The permit
    /// auto-releases on drop.
    pub fn try_acquire(&self, conversation_id: &str) -> Result<OwnedSemaphorePermit, TurnBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(conversation_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().map_err(|_| TurnBusy)
    }

    pub fn conversation_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop entries for conversations with no turn in flight.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// A turn is already in progress for this conversation.
#[derive(Debug)]
pub struct TurnBusy;

impl std::fmt::Display for TurnBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a turn is already in progress for this conversation")
    }
}

impl std::error::Error for TurnBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let map = TurnLockMap::new();
        let permit = map.try_acquire("c1").unwrap();
        assert!(map.try_acquire("c1").is_err());
        drop(permit);
        assert!(map.try_acquire("c1").is_ok());
    }

    #[test]
    fn conversations_do_not_contend() {
        let map = TurnLockMap::new();
        let _p1 = map.try_acquire("c1").unwrap();
        let _p2 = map.try_acquire("c2").unwrap();
        assert_eq!(map.conversation_count(), 2);
    }

    #[test]
    fn prune_keeps_held_locks() {
        let map = TurnLockMap::new();
        let _held = map.try_acquire("held").unwrap();
        let released = map.try_acquire("released").unwrap();
        drop(released);
        map.prune_idle();
        assert_eq!(map.conversation_count(), 1);
    }
}
