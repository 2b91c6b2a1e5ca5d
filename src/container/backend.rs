use async_trait::async_trait;
use std::fmt::Debug;
use std::fmt::Display;
use tokio_util::sync::CancellationToken;

use super::key::ContainerArgs;
use super::key::ContainerProperties;

/// The database SDK as seen by [`ContainerAccessor`](super::ContainerAccessor).
///
/// Implementations are free to cache clients on their own; [`client()`](ContainerBackend::client) is only called when
/// a container handle is being built.
#[async_trait]
pub trait ContainerBackend: Send + Sync + 'static {
    type Client: Send + Sync + 'static;
    /// A handle to a container. It is cloned out of the cache on every access.
    type Container: Debug + Clone + Send + Sync + 'static;
    type Error: Display + Debug + Send + Sync + 'static;

    async fn client(
        &self,
        endpoint: &str,
        account_key: &str,
        token: &CancellationToken,
    ) -> Result<Self::Client, Self::Error>;

    /// Create the container if it doesn't exist.
    async fn ensure_container(&self, args: &ContainerArgs, token: &CancellationToken) -> Result<(), Self::Error>;

    fn container(&self, client: &Self::Client, database: &str, container: &str) -> Self::Container;

    async fn list_containers(
        &self,
        endpoint: &str,
        account_key: &str,
        database: &str,
        token: &CancellationToken,
    ) -> Result<Vec<ContainerProperties>, Self::Error>;

    async fn delete_container(&self, container: &Self::Container, token: &CancellationToken)
        -> Result<(), Self::Error>;

    /// Synchronous release of a handle dropped by the accessor's cache; see
    /// [`Factory::teardown()`](crate::Factory::teardown).
    fn drop_container(&self, _container: Self::Container) {}

    /// Called once for every handle the accessor's cache drops while closing asynchronously or on removal. Defaults to
    /// [`drop_container()`](ContainerBackend::drop_container).
    async fn release_container(&self, container: Self::Container) {
        self.drop_container(container)
    }
}
