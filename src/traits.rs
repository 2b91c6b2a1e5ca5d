use async_trait::async_trait;
use std::fmt::Debug;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// The constructor of cached values, supplied to [`KeyedCache`](crate::KeyedCache) once, when it is built.
///
/// Besides constructing values the factory is also the disposal contract: whenever the cache lets go of a value it
/// owns, on [`remove()`](crate::KeyedCache::remove) or when the cache is closed, the value is handed back to
/// [`teardown()`](Factory::teardown) or [`teardown_async()`](Factory::teardown_async) exactly once.
#[async_trait]
pub trait Factory: Sized + Send + Sync + 'static {
    /// Two keys that compare equal refer to the same cache entry.
    type Key: Debug + Hash + Clone + Eq + Send + Sync + 'static;
    /// Construction arguments. They are moved into [`create()`](Factory::create) and never retained by the cache.
    type Args: Send + 'static;
    /// Cached values are cloned out to callers; use an `Arc` for anything expensive to clone.
    type Value: Clone + Send + Sync + 'static;
    type Error: Display + Debug + Send + Sync + 'static;

    /// Build a value for the key. The token is the caller's; a long construction should stop once it fires.
    async fn create(
        &self,
        key: &Self::Key,
        args: Self::Args,
        token: CancellationToken,
    ) -> Result<Self::Value, Self::Error>;

    /// Release a value the cache no longer holds. Called by [`close_sync()`](crate::KeyedCache::close_sync) and when
    /// the cache is dropped.
    fn teardown(&self, _key: &Self::Key, _value: Self::Value) {}

    /// Asynchronous counterpart of [`teardown()`](Factory::teardown), used by
    /// [`close()`](crate::KeyedCache::close) and [`remove()`](crate::KeyedCache::remove). Defaults to the
    /// synchronous version.
    async fn teardown_async(&self, key: &Self::Key, value: Self::Value) {
        self.teardown(key, value)
    }
}

/// Adapter turning an async closure into a [`Factory`] with no-op teardown.
///
/// ```ignore
/// let factory = FnFactory::new(|key: String, _args: (), _token| async move {
///     Ok::<_, std::convert::Infallible>(key.to_uppercase())
/// });
/// ```
pub struct FnFactory<K, A, V, E, Fun> {
    fun:    Fun,
    _types: PhantomData<fn(K, A) -> Result<V, E>>,
}

impl<K, A, V, E, Fun> FnFactory<K, A, V, E, Fun> {
    pub fn new<Fut>(fun: Fun) -> Self
    where
        Fun: Fn(K, A, CancellationToken) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        Self {
            fun,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<K, A, V, E, Fun, Fut> Factory for FnFactory<K, A, V, E, Fun>
where
    K: Debug + Hash + Clone + Eq + Send + Sync + 'static,
    A: Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Display + Debug + Send + Sync + 'static,
    Fun: Fn(K, A, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    type Args = A;
    type Error = E;
    type Key = K;
    type Value = V;

    async fn create(&self, key: &K, args: A, token: CancellationToken) -> Result<V, E> {
        (self.fun)(key.clone(), args, token).await
    }
}

impl<K, A, V, E, Fun> Debug for FnFactory<K, A, V, E, Fun> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "FnFactory<{}>", std::any::type_name::<V>())
    }
}
