use crate::key_lock::KeyLock;
use crate::key_lock::KeyLocks;
use crate::prelude::*;
use fieldx::fxstruct;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::MutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

type Entries<F> = moka::sync::Cache<<F as Factory>::Key, <F as Factory>::Value>;
type FailureGuard<'a, F> = MutexGuard<'a, Option<Arc<<F as Factory>::Error>>>;

/// A keyed singleton factory: every key gets its value constructed at most once at a time, and a successfully built
/// value is shared by everybody asking for that key until it is removed or the cache is closed.
///
/// ```ignore
/// let cache = KeyedCache::builder()
///     .factory(ContainerFactory::new(backend, true))
///     .name("containers")
///     .build()?;
///
/// let container = cache.get_or_create(key, args, &CancellationToken::new()).await?;
/// // ...
/// cache.close().await;
/// ```
///
/// Only callers requesting the same key ever wait for each other. Construction errors are not cached: the caller that
/// ran the factory and those that waited on it get the same error, the next call tries again.
#[fxstruct(
    sync,
    no_new,
    default(off),
    builder(
        doc("Builder object of [`KeyedCache`].", "", "See [`KeyedCache::builder()`] method."),
        method_doc("Implement builder pattern for [`KeyedCache`]."),
    )
)]
pub struct KeyedCache<F>
where
    F: Factory,
{
    #[fieldx(vis(pub(crate)), builder(vis(pub), required, into), get(clone))]
    factory: Arc<F>,

    /// Cache name. Most useful for debugging and logging.
    #[fieldx(get(clone), builder(into), default(String::from("anonymous")))]
    name: String,

    /// Preallocated number of entry slots.
    #[fieldx(get(copy), default(64))]
    initial_capacity: usize,

    #[fieldx(lazy, private, get(clone), builder(off))]
    entries: Arc<Entries<F>>,

    #[fieldx(private, get, builder(off), default(Mutex::new(KeyLocks::default())))]
    key_locks: Mutex<KeyLocks<F::Key, F::Error>>,

    // Fired on close; aborts constructions still in flight.
    #[fieldx(private, get, builder(off), default(CancellationToken::new()))]
    shutdown: CancellationToken,
}

impl<F> KeyedCache<F>
where
    F: Factory,
{
    fn build_entries(&self) -> Arc<Entries<F>> {
        Arc::new(
            moka::sync::Cache::builder()
                .name(&self.name())
                .initial_capacity(self.initial_capacity())
                .build(),
        )
    }

    /// Shortcut for a cache with default settings.
    pub fn new(factory: impl Into<Arc<F>>) -> Self {
        Self::builder()
            .factory(factory)
            .build()
            .expect("KeyedCache builder has all required fields")
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shutdown().is_cancelled()
    }

    /// Returns the value for the key if it is already built. Never runs the factory.
    pub fn get(&self, key: &F::Key) -> Option<F::Value> {
        if self.is_closed() {
            return None;
        }
        self.entries().get(key)
    }

    pub fn contains_key(&self, key: &F::Key) -> bool {
        self.get(key).is_some()
    }

    /// Number of materialized values.
    pub fn len(&self) -> usize {
        self.entries().iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the value for the key, constructing it with the factory if there is none yet.
    ///
    /// If another caller is already constructing the value, wait for it and return its result. If that construction
    /// fails, this call fails with the same error; if it gets cancelled by its caller, this call takes over and runs
    /// the factory itself.
    ///
    /// `token` cancels this call only. When it fires while this call is running the factory, the factory is dropped
    /// and the call fails with [`CacheError::Cancelled`].
    #[instrument(level = "trace", skip(self, args, token), fields(cache = %self.name()))]
    pub async fn get_or_create(
        &self,
        key: F::Key,
        args: F::Args,
        token: &CancellationToken,
    ) -> CacheResult<F::Value, F::Error> {
        loop {
            if self.is_closed() {
                return Err(CacheError::Disposed);
            }

            if let Some(value) = self.entries().get(&key) {
                return Ok(value);
            }

            let key_lock = self.key_locks().lock().get_or_insert(&key).ok_or(CacheError::Disposed)?;
            let seen_failures = key_lock.failures();

            let outcome = match self.lock_key(&key_lock, token).await {
                Err(err) => Err(err),
                Ok(mut guard) => {
                    if !self.key_locks().lock().is_current(&key, &key_lock) {
                        // The key was removed while we were waiting. Start over with a fresh lock.
                        trace!("[{}] lock for {key:?} went stale, retrying", self.name());
                        continue;
                    }

                    if let Some(value) = self.entries().get(&key) {
                        return Ok(value);
                    }

                    // Only callers that queued up on the failed attempt share its error.
                    let shared = match &*guard {
                        Some(error) if key_lock.failures() != seen_failures => Some(Arc::clone(error)),
                        _ => None,
                    };

                    if let Some(error) = shared {
                        debug!("[{}] sharing construction failure of {key:?}", self.name());
                        Err(CacheError::ConstructionFailed(error))
                    }
                    else {
                        self.construct(&key, args, token, &key_lock, &mut guard).await
                    }
                }
            };

            if outcome.is_err() {
                self.release_idle_lock(&key, key_lock);
            }

            return outcome;
        }
    }

    // Waits for the key's lock unless the caller or the cache gives up first.
    async fn lock_key<'a>(
        &self,
        key_lock: &'a KeyLock<F::Error>,
        token: &CancellationToken,
    ) -> CacheResult<FailureGuard<'a, F>, F::Error> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(CacheError::Cancelled),
            _ = self.shutdown().cancelled() => Err(CacheError::Disposed),
            guard = key_lock.lock() => Ok(guard),
        }
    }

    // A key that ended up without a value keeps no lock unless somebody else still holds it. Must be called after the
    // key's guard is released. Lock references are only taken out under the table mutex, and releasers drop theirs
    // under it too, so the last one out sees an exact count.
    fn release_idle_lock(&self, key: &F::Key, key_lock: Arc<KeyLock<F::Error>>) {
        let mut key_locks = self.key_locks().lock();
        if !self.entries().contains_key(key) && key_locks.remove_if_idle(key, &key_lock) {
            trace!("[{}] dropped idle lock of {key:?}", self.name());
        }
        drop(key_lock);
    }

    // Runs under the key's lock.
    async fn construct(
        &self,
        key: &F::Key,
        args: F::Args,
        token: &CancellationToken,
        key_lock: &KeyLock<F::Error>,
        guard: &mut FailureGuard<'_, F>,
    ) -> CacheResult<F::Value, F::Error> {
        debug!("[{}] constructing {key:?}", self.name());

        let factory = self.factory();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("[{}] construction of {key:?} cancelled by caller", self.name());
                return Err(CacheError::Cancelled);
            }
            _ = self.shutdown().cancelled() => {
                debug!("[{}] construction of {key:?} aborted by close", self.name());
                return Err(CacheError::Disposed);
            }
            outcome = factory.create(key, args, token.clone()) => outcome,
        };

        match outcome {
            Ok(value) => {
                **guard = None;
                if self.store(key, value.clone()) {
                    debug!("[{}] {key:?} constructed", self.name());
                    Ok(value)
                }
                else {
                    // Closed while the factory was running; the value never made it into the table.
                    factory.teardown_async(key, value).await;
                    Err(CacheError::Disposed)
                }
            }
            Err(error) => {
                debug!("[{}] construction of {key:?} failed: {error}", self.name());
                let error = Arc::new(error);
                key_lock.record_failure(guard, Arc::clone(&error));
                Err(CacheError::ConstructionFailed(error))
            }
        }
    }

    // Insertion and the closed check happen under the lock table mutex so that closing can't miss a value.
    fn store(&self, key: &F::Key, value: F::Value) -> bool {
        let key_locks = self.key_locks().lock();
        if key_locks.is_closed() {
            return false;
        }
        self.entries().insert(key.clone(), value);
        true
    }

    /// Drop the value for the key and the key's lock. The next [`get_or_create()`](Self::get_or_create) for the key
    /// constructs the value anew.
    ///
    /// If the key's value is being constructed right now, wait for the construction to settle first. The removed
    /// value is passed to [`Factory::teardown_async()`].
    ///
    /// Teardown runs after the key is released, so a new value for the same key may already be under construction
    /// while the old one is still being torn down.
    #[instrument(level = "trace", skip(self, token), fields(cache = %self.name()))]
    pub async fn remove(&self, key: &F::Key, token: &CancellationToken) -> CacheResult<(), F::Error> {
        let removed = loop {
            if self.is_closed() {
                return Err(CacheError::Disposed);
            }

            let Some(key_lock) = self.key_locks().lock().get(key)
            else {
                // Values never exist without a lock; nothing to do.
                return Ok(());
            };

            let outcome = match self.lock_key(&key_lock, token).await {
                Err(err) => Err(err),
                Ok(_guard) => {
                    let mut key_locks = self.key_locks().lock();
                    if key_locks.is_closed() {
                        Err(CacheError::Disposed)
                    }
                    else if key_locks.remove_if_current(key, &key_lock) {
                        Ok(Some(self.entries().remove(key)))
                    }
                    else {
                        Ok(None)
                    }
                }
            };

            match outcome {
                Ok(Some(removed)) => break removed,
                Ok(None) => (),
                Err(err) => {
                    self.release_idle_lock(key, key_lock);
                    return Err(err);
                }
            }

            // Somebody removed the key while we were waiting and the key may have been requested again since. Repeat
            // with the current lock.
        };

        debug!("[{}] removed {key:?} (had value: {})", self.name(), removed.is_some());

        if let Some(value) = removed {
            self.factory().teardown_async(key, value).await;
        }

        Ok(())
    }

    // Returns the locks of the table if this call is the one closing the cache.
    fn shut_down(&self) -> Option<Vec<Arc<KeyLock<F::Error>>>> {
        let locks = self.key_locks().lock().close()?;
        self.shutdown().cancel();
        Some(locks)
    }

    fn drain(&self) -> Vec<(F::Key, F::Value)> {
        let entries = self.entries();
        let keys = entries.iter().map(|(key, _)| (*key).clone()).collect::<Vec<_>>();
        // `remove` hands a value out only once, even if two drains race.
        keys.into_iter()
            .filter_map(|key| entries.remove(&key).map(|value| (key, value)))
            .collect()
    }

    /// Close the cache. Constructions in flight are cancelled and waited for, then every cached value is passed to
    /// [`Factory::teardown_async()`]. Subsequent operations fail with [`CacheError::Disposed`].
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let Some(locks) = self.shut_down()
        else {
            return;
        };

        debug!("[{}] closing; {} key lock(s) to settle", self.name(), locks.len());

        // In-flight constructions observe the shutdown token and release their locks promptly.
        for key_lock in locks {
            drop(key_lock.lock().await);
        }

        let factory = self.factory();
        let drained = self.drain();
        debug!("[{}] releasing {} value(s)", self.name(), drained.len());
        for (key, value) in drained {
            factory.teardown_async(&key, value).await;
        }
    }

    /// Synchronous variant of [`close()`](Self::close) using [`Factory::teardown()`]. It doesn't wait for in-flight
    /// constructions; they are cancelled and whatever they produce is released by them.
    pub fn close_sync(&self) {
        if self.shut_down().is_none() {
            return;
        }

        let factory = self.factory();
        let drained = self.drain();
        debug!("[{}] closed; releasing {} value(s)", self.name(), drained.len());
        for (key, value) in drained {
            factory.teardown(&key, value);
        }
    }
}

impl<F> Drop for KeyedCache<F>
where
    F: Factory,
{
    fn drop(&mut self) {
        self.close_sync();
    }
}

impl<F> Debug for KeyedCache<F>
where
    F: Factory,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedCache")
            .field("name", &self.name())
            .field("closed", &self.is_closed())
            .field("locks", &self.key_locks().lock().len())
            .finish()
    }
}
