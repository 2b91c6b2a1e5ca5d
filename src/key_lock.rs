use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

// Serializes constructions of a single key. A caller holds the mutex for as long as it takes the factory to finish
// with the key, so only callers of the same key ever wait on it.
//
// The mutex protects the last construction failure. Waiters note `failures` before queueing; if the counter moved by
// the time they get the lock, they were waiting on an attempt that failed and share its error instead of starting a
// new one.
pub(crate) struct KeyLock<E> {
    failures: AtomicU64,
    failure:  Mutex<Option<Arc<E>>>,
}

impl<E> KeyLock<E> {
    pub(crate) fn new() -> Self {
        Self {
            failures: AtomicU64::new(0),
            failure:  Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Option<Arc<E>>> {
        self.failure.lock().await
    }

    // Must be called with the guard obtained from this very lock.
    pub(crate) fn record_failure(&self, guard: &mut MutexGuard<'_, Option<Arc<E>>>, error: Arc<E>) {
        **guard = Some(error);
        self.failures.fetch_add(1, Ordering::AcqRel);
    }
}

impl<E> Debug for KeyLock<E> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "KeyLock {{ failures: {} }}", self.failures())
    }
}

// The table of per-key locks. Lives behind a short-lived mutex: it is only held to look up, insert or drop a lock,
// never while a lock is being awaited or a value is being built.
pub(crate) struct KeyLocks<K, E> {
    closed: bool,
    locks:  HashMap<K, Arc<KeyLock<E>>>,
}

impl<K, E> Default for KeyLocks<K, E> {
    fn default() -> Self {
        Self {
            closed: false,
            locks:  HashMap::new(),
        }
    }
}

impl<K, E> KeyLocks<K, E>
where
    K: Hash + Eq + Clone,
{
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    // None when the table is closed.
    pub(crate) fn get_or_insert(&mut self, key: &K) -> Option<Arc<KeyLock<E>>> {
        if self.closed {
            return None;
        }
        Some(Arc::clone(
            self.locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(KeyLock::new())),
        ))
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<KeyLock<E>>> {
        self.locks.get(key).cloned()
    }

    // A lock stops being current once it was dropped from the table by a removal or by closing.
    pub(crate) fn is_current(&self, key: &K, lock: &Arc<KeyLock<E>>) -> bool {
        !self.closed && self.locks.get(key).is_some_and(|current| Arc::ptr_eq(current, lock))
    }

    pub(crate) fn remove_if_current(&mut self, key: &K, lock: &Arc<KeyLock<E>>) -> bool {
        if self.is_current(key, lock) {
            self.locks.remove(key);
            true
        }
        else {
            false
        }
    }

    // Drops the lock if the table and the caller hold the only references to it.
    pub(crate) fn remove_if_idle(&mut self, key: &K, lock: &Arc<KeyLock<E>>) -> bool {
        Arc::strong_count(lock) == 2 && self.remove_if_current(key, lock)
    }

    // Marks the table closed and hands out every lock it held. Returns None if already closed.
    pub(crate) fn close(&mut self) -> Option<Vec<Arc<KeyLock<E>>>> {
        if self.closed {
            return None;
        }
        self.closed = true;
        Some(self.locks.drain().map(|(_, lock)| lock).collect())
    }

    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}
