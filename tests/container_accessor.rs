use std::sync::Arc;

use singleton_cache::container::AccessorError;
use singleton_cache::container::ContainerAccessor;
use singleton_cache::container::ContainerSettings;
use singleton_cache::test::init_tracing;
use singleton_cache::test::MockBackend;
use tokio_util::sync::CancellationToken;

const ENDPOINT: &str = "https://db.example";

fn accessor(backend: MockBackend, ensure: bool) -> (Arc<MockBackend>, ContainerAccessor<MockBackend>) {
    init_tracing();
    let backend = Arc::new(backend);
    let accessor = ContainerAccessor::builder()
        .backend(Arc::clone(&backend))
        .settings(ContainerSettings::new(ENDPOINT, "key", "main").with_ensure_container_on_first_use(ensure))
        .build()
        .unwrap();
    (backend, accessor)
}

#[tokio::test]
async fn handle_is_built_once() {
    let (backend, accessor) = accessor(MockBackend::default(), true);
    let token = CancellationToken::new();

    let first = accessor.get(ENDPOINT, "key", "main", "users", &token).await.unwrap();
    let second = accessor.get(ENDPOINT, "rotated", "main", "users", &token).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.clients(), 1);
    assert_eq!(backend.ensures(), 1);
    assert!(backend.exists(ENDPOINT, "main", "users"));

    accessor.get(ENDPOINT, "key", "other", "users", &token).await.unwrap();
    assert_eq!(backend.clients(), 2);
}

#[tokio::test]
async fn default_target_comes_from_settings() {
    let (backend, accessor) = accessor(MockBackend::default(), true);
    let token = CancellationToken::new();

    let handle = accessor.get_default("orders", &token).await.unwrap();
    assert_eq!(handle.endpoint, ENDPOINT);
    assert_eq!(handle.database, "main");
    assert_eq!(handle.id, "orders");

    // Same key as the explicit form.
    accessor.get(ENDPOINT, "key", "main", "orders", &token).await.unwrap();
    assert_eq!(backend.clients(), 1);
}

#[tokio::test]
async fn existence_check_can_be_disabled() {
    let (backend, accessor) = accessor(MockBackend::default(), false);
    let token = CancellationToken::new();

    accessor.get_default("users", &token).await.unwrap();
    assert_eq!(backend.ensures(), 0);
    assert!(!backend.exists(ENDPOINT, "main", "users"));
}

#[tokio::test]
async fn backend_failure_is_not_cached() {
    let (backend, accessor) = accessor(MockBackend::default(), true);
    let token = CancellationToken::new();

    let err = accessor.get(ENDPOINT, "", "main", "users", &token).await.unwrap_err();
    assert!(matches!(err, AccessorError::Cache(ref e) if e.construction_error().is_some()), "{err:?}");

    accessor.get(ENDPOINT, "key", "main", "users", &token).await.unwrap();
    assert_eq!(backend.clients(), 1);
}

#[tokio::test]
async fn delete_drops_container_and_handle() {
    let (backend, accessor) = accessor(MockBackend::default(), true);
    let token = CancellationToken::new();

    accessor.get_default("users", &token).await.unwrap();
    accessor.delete_default("users", &token).await.unwrap();

    assert!(!backend.exists(ENDPOINT, "main", "users"));
    assert_eq!(backend.deletes(), 1);
    assert_eq!(backend.released(), vec!["users".to_string()]);

    // The next access builds a new handle and recreates the container.
    accessor.get_default("users", &token).await.unwrap();
    assert_eq!(backend.ensures(), 2);
    assert!(backend.exists(ENDPOINT, "main", "users"));
}

#[tokio::test]
async fn delete_of_missing_container_reports_backend_error() {
    let (backend, accessor) = accessor(MockBackend::default(), false);
    let token = CancellationToken::new();

    let err = accessor.delete_default("ghost", &token).await.unwrap_err();
    assert!(matches!(err, AccessorError::Backend(_)), "{err:?}");
    assert_eq!(backend.deletes(), 0);
}

#[tokio::test]
async fn listing_and_bulk_delete() {
    let backend = MockBackend::default()
        .with_containers(ENDPOINT, "main", &["a", "b", "c"])
        .with_containers(ENDPOINT, "other", &["z"]);
    let (backend, accessor) = accessor(backend, false);
    let token = CancellationToken::new();

    let ids = accessor
        .get_all_default(&token)
        .await
        .unwrap()
        .into_iter()
        .map(|props| props.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["a", "b", "c"]);

    accessor.delete_all_default(&token).await.unwrap();
    assert!(accessor.get_all_default(&token).await.unwrap().is_empty());
    assert_eq!(backend.deletes(), 3);
    assert!(backend.exists(ENDPOINT, "other", "z"));

    let other = accessor.get_all(ENDPOINT, "key", "other", &token).await.unwrap();
    assert_eq!(other.len(), 1);
}

#[tokio::test]
async fn close_releases_handles() {
    let (backend, accessor) = accessor(MockBackend::default(), true);
    let token = CancellationToken::new();

    accessor.get_default("a", &token).await.unwrap();
    accessor.get_default("b", &token).await.unwrap();

    accessor.close().await;
    accessor.close_sync();

    let mut released = backend.released();
    released.sort();
    assert_eq!(released, vec!["a".to_string(), "b".to_string()]);

    let err = accessor.get_default("a", &token).await.unwrap_err();
    assert!(matches!(err, AccessorError::Cache(ref e) if e.is_disposed()), "{err:?}");
}
