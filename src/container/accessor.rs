use async_trait::async_trait;
use fieldx::fxstruct;
use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::instrument;
use tracing::warn;

use super::backend::ContainerBackend;
use super::key::ContainerArgs;
use super::key::ContainerKey;
use super::key::ContainerProperties;
use super::settings::ContainerSettings;
use crate::prelude::*;

#[derive(thiserror::Error)]
pub enum AccessorError<E>
where
    E: Display + Debug + Send + Sync + 'static,
{
    #[error(transparent)]
    Cache(#[from] CacheError<E>),

    #[error("container backend error: {0}")]
    Backend(E),
}

impl<E> Debug for AccessorError<E>
where
    E: Display + Debug + Send + Sync + 'static,
{
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache(e) => fmt.debug_tuple("AccessorError::Cache").field(e).finish(),
            Self::Backend(e) => fmt.debug_tuple("AccessorError::Backend").field(e).finish(),
        }
    }
}

pub type AccessorResult<T, E> = Result<T, AccessorError<E>>;

/// Builds container handles for the accessor's cache: obtains a client for the endpoint, makes sure the container
/// exists when asked to, and hands out the handle.
pub struct ContainerFactory<B>
where
    B: ContainerBackend,
{
    backend:                       Arc<B>,
    ensure_container_on_first_use: bool,
}

impl<B> ContainerFactory<B>
where
    B: ContainerBackend,
{
    pub fn new(backend: Arc<B>, ensure_container_on_first_use: bool) -> Self {
        Self {
            backend,
            ensure_container_on_first_use,
        }
    }
}

#[async_trait]
impl<B> Factory for ContainerFactory<B>
where
    B: ContainerBackend,
{
    type Args = ContainerArgs;
    type Error = B::Error;
    type Key = ContainerKey;
    type Value = B::Container;

    async fn create(
        &self,
        key: &ContainerKey,
        args: ContainerArgs,
        token: CancellationToken,
    ) -> Result<B::Container, B::Error> {
        let client = self.backend.client(&args.endpoint, &args.account_key, &token).await?;

        if self.ensure_container_on_first_use {
            debug!("Ensuring container {key} exists");
            self.backend.ensure_container(&args, &token).await?;
        }

        Ok(self.backend.container(&client, &args.database, &args.container))
    }

    fn teardown(&self, _key: &ContainerKey, container: B::Container) {
        self.backend.drop_container(container);
    }

    async fn teardown_async(&self, _key: &ContainerKey, container: B::Container) {
        self.backend.release_container(container).await;
    }
}

impl<B> Debug for ContainerFactory<B>
where
    B: ContainerBackend,
{
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("ContainerFactory")
            .field("ensure_container_on_first_use", &self.ensure_container_on_first_use)
            .finish()
    }
}

/// Cached access to database containers.
///
/// ```ignore
/// let accessor = ContainerAccessor::builder()
///     .backend(backend)
///     .settings(ContainerSettings::from_env()?)
///     .build()?;
///
/// let users = accessor.get_default("users", &token).await?;
/// ```
///
/// Handles are cached per endpoint, database and container; the first access to a container may create it in the
/// database, see [`ContainerSettings::ensure_container_on_first_use()`].
#[fxstruct(
    sync,
    no_new,
    default(off),
    builder(
        doc("Builder object of [`ContainerAccessor`].", "", "See [`ContainerAccessor::builder()`] method."),
        method_doc("Implement builder pattern for [`ContainerAccessor`]."),
    )
)]
pub struct ContainerAccessor<B>
where
    B: ContainerBackend,
{
    #[fieldx(builder(vis(pub), required, into), get(clone))]
    backend: Arc<B>,

    #[fieldx(builder(vis(pub), required), get)]
    settings: ContainerSettings,

    #[fieldx(lazy, private, get(clone), builder(off))]
    containers: Arc<KeyedCache<ContainerFactory<B>>>,
}

impl<B> ContainerAccessor<B>
where
    B: ContainerBackend,
{
    fn build_containers(&self) -> Arc<KeyedCache<ContainerFactory<B>>> {
        Arc::new(KeyedCache::new(ContainerFactory::new(
            self.backend(),
            self.settings().ensure_container_on_first_use(),
        )))
    }

    fn default_args(&self, container: &str) -> ContainerArgs {
        let settings = self.settings();
        ContainerArgs::new(
            settings.endpoint(),
            settings.account_key(),
            settings.database_name(),
            container,
        )
    }

    /// The container handle, built on first access.
    pub async fn get(
        &self,
        endpoint: &str,
        account_key: &str,
        database: &str,
        container: &str,
        token: &CancellationToken,
    ) -> AccessorResult<B::Container, B::Error> {
        self.get_with_args(ContainerArgs::new(endpoint, account_key, database, container), token)
            .await
    }

    /// Same as [`get()`](Self::get) using the endpoint, account key and database from the settings.
    pub async fn get_default(&self, container: &str, token: &CancellationToken) -> AccessorResult<B::Container, B::Error> {
        self.get_with_args(self.default_args(container), token).await
    }

    pub async fn get_with_args(
        &self,
        args: ContainerArgs,
        token: &CancellationToken,
    ) -> AccessorResult<B::Container, B::Error> {
        Ok(self.containers().get_or_create(args.key(), args, token).await?)
    }

    /// Delete the container from the database and forget its handle.
    #[instrument(level = "trace", skip(self, account_key, token))]
    pub async fn delete(
        &self,
        endpoint: &str,
        account_key: &str,
        database: &str,
        container: &str,
        token: &CancellationToken,
    ) -> AccessorResult<(), B::Error> {
        self.delete_with_args(ContainerArgs::new(endpoint, account_key, database, container), token)
            .await
    }

    pub async fn delete_default(&self, container: &str, token: &CancellationToken) -> AccessorResult<(), B::Error> {
        self.delete_with_args(self.default_args(container), token).await
    }

    async fn delete_with_args(&self, args: ContainerArgs, token: &CancellationToken) -> AccessorResult<(), B::Error> {
        error!(
            "Deleting container {} in database {}!",
            args.container, args.database
        );

        let key = args.key();
        let containers = self.containers();
        let handle = containers.get_or_create(key.clone(), args.clone(), token).await?;

        self.backend()
            .delete_container(&handle, token)
            .await
            .map_err(AccessorError::Backend)?;
        containers.remove(&key, token).await?;

        warn!(
            "Finished deleting container {} in database {}",
            args.container, args.database
        );
        Ok(())
    }

    /// List the containers of a database.
    pub async fn get_all(
        &self,
        endpoint: &str,
        account_key: &str,
        database: &str,
        token: &CancellationToken,
    ) -> AccessorResult<Vec<ContainerProperties>, B::Error> {
        self.backend()
            .list_containers(endpoint, account_key, database, token)
            .await
            .map_err(AccessorError::Backend)
    }

    pub async fn get_all_default(&self, token: &CancellationToken) -> AccessorResult<Vec<ContainerProperties>, B::Error> {
        let settings = self.settings();
        self.get_all(&settings.endpoint(), &settings.account_key(), &settings.database_name(), token)
            .await
    }

    /// Delete every container of a database, one by one.
    #[instrument(level = "trace", skip(self, account_key, token))]
    pub async fn delete_all(
        &self,
        endpoint: &str,
        account_key: &str,
        database: &str,
        token: &CancellationToken,
    ) -> AccessorResult<(), B::Error> {
        let containers = self.get_all(endpoint, account_key, database, token).await?;
        debug!("Deleting {} container(s) in database {database}", containers.len());

        for props in containers {
            self.delete(endpoint, account_key, database, &props.id, token).await?;
        }

        Ok(())
    }

    pub async fn delete_all_default(&self, token: &CancellationToken) -> AccessorResult<(), B::Error> {
        let settings = self.settings();
        self.delete_all(&settings.endpoint(), &settings.account_key(), &settings.database_name(), token)
            .await
    }

    /// Release all cached handles through [`ContainerBackend::release_container()`]. The accessor can't be used
    /// afterwards.
    pub async fn close(&self) {
        self.containers().close().await;
    }

    pub fn close_sync(&self) {
        self.containers().close_sync();
    }
}

impl<B> Debug for ContainerAccessor<B>
where
    B: ContainerBackend,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerAccessor")
            .field("settings", self.settings())
            .finish()
    }
}
