use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;

/// Errors reported by [`KeyedCache`](crate::KeyedCache) operations.
///
/// `E` is the factory's own error type. A construction error is wrapped into an [`Arc`] because the same failure is
/// handed to the caller that ran the factory and to every caller that was waiting on that attempt.
#[derive(thiserror::Error)]
pub enum CacheError<E>
where
    E: Display + Debug + Send + Sync + 'static,
{
    #[error("value construction failed: {0}")]
    ConstructionFailed(Arc<E>),

    #[error("operation cancelled")]
    Cancelled,

    #[error("cache is disposed")]
    Disposed,
}

impl<E> CacheError<E>
where
    E: Display + Debug + Send + Sync + 'static,
{
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// The factory error if this is a construction failure.
    pub fn construction_error(&self) -> Option<&Arc<E>> {
        match self {
            Self::ConstructionFailed(err) => Some(err),
            _ => None,
        }
    }
}

// Manual impl to avoid requiring `E: Clone`.
impl<E> Clone for CacheError<E>
where
    E: Display + Debug + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Self::ConstructionFailed(err) => Self::ConstructionFailed(Arc::clone(err)),
            Self::Cancelled => Self::Cancelled,
            Self::Disposed => Self::Disposed,
        }
    }
}

impl<E> Debug for CacheError<E>
where
    E: Display + Debug + Send + Sync + 'static,
{
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstructionFailed(e) => fmt.debug_tuple("CacheError::ConstructionFailed").field(e).finish(),
            Self::Cancelled => fmt.write_str("CacheError::Cancelled"),
            Self::Disposed => fmt.write_str("CacheError::Disposed"),
        }
    }
}

pub type CacheResult<T, E> = Result<T, CacheError<E>>;
