//! # singleton-cache
//!
//! Keyed lazy initialization for expensive, shareable async resources: database clients, container handles,
//! connection pools.
//!
//! # The Basics
//!
//! [`KeyedCache`] keeps one value per key and builds it on demand with a user-supplied [`Factory`]. The cache
//! guarantees that:
//!
//! - construction of a value for a key runs at most once at a time; concurrent callers of the same key wait for the
//!   one that runs the factory and receive the same value;
//! - callers of different keys never wait for each other;
//! - a failed construction is not cached; the next request tries again;
//! - every value the cache lets go of, by [`remove()`](KeyedCache::remove) or by closing the cache, is passed to the
//!   factory's teardown exactly once.
//!
//! ```ignore
//! let cache = KeyedCache::new(FnFactory::new(|key: String, _args: (), _token| async move {
//!     Ok::<_, std::convert::Infallible>(key.to_uppercase())
//! }));
//! let token = CancellationToken::new();
//! assert_eq!(cache.get_or_create("abc".to_string(), (), &token).await?, "ABC");
//! cache.close().await;
//! ```
//!
//! Every operation takes a [`CancellationToken`](tokio_util::sync::CancellationToken) that cancels that operation
//! only. If the caller running a factory cancels, the factory is dropped and one of the callers waiting on the key
//! takes over.
//!
//! # Containers
//!
//! The [`container`] module applies the cache to database containers: it keeps one container handle per
//! endpoint/database/container triple, makes sure the container exists on first use, and offers listing and
//! deletion helpers. The database SDK itself is plugged in through the [`ContainerBackend`](container::ContainerBackend)
//! trait.

pub mod cache;
pub mod container;
pub(crate) mod key_lock;
pub mod test;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use cache::KeyedCache;
#[doc(inline)]
pub use traits::Factory;

pub mod prelude {
    pub use crate::cache::KeyedCache;
    pub use crate::traits::Factory;
    pub use crate::traits::FnFactory;
    pub use crate::types::*;
}
