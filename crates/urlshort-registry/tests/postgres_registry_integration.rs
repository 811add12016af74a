//! Requires Docker; run with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use urlshort_registry::{Registry, RegistryError, RegistrySettings};
use urlshort_storage::{PostgresBackend, StorageBackend};
use urlshort_test_infra::postgres::{PostgresConfig, PostgresServer};

async fn connect_with_retry(url: &str) -> PostgresBackend {
    let mut last_error = None;

    for _ in 0..20 {
        match PostgresBackend::connect(url).await {
            Ok(backend) => return backend,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

async fn start() -> (PostgresServer, Registry) {
    let postgres = PostgresServer::new(PostgresConfig::builder().build())
        .await
        .expect("start postgres");
    let url = postgres.database_url().await.expect("postgres url");

    let backend = connect_with_retry(&url).await;
    backend.bootstrap().await.expect("create schema");

    let registry = Registry::new(Arc::new(backend), RegistrySettings::default());
    (postgres, registry)
}

#[tokio::test]
#[ignore = "requires docker"]
async fn create_dedups_through_the_database() {
    let (_postgres, registry) = start().await;

    let first = registry.create("https://example.com", "").await.unwrap();
    let err = registry.create("https://example.com", "").await.unwrap_err();

    assert_eq!(err.existing(), Some(&first));
    assert_eq!(registry.resolve(&first.id).await.unwrap(), first);
    assert!(matches!(
        registry.resolve("missing1").await,
        Err(RegistryError::NotFound(_))
    ));
    registry.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn batch_then_owner_delete() {
    let (_postgres, registry) = start().await;

    let links = registry
        .create_batch(
            &["https://a.example", "https://b.example", "https://a.example"],
            "alice",
        )
        .await
        .unwrap();
    assert_eq!(links.len(), 3);
    assert_eq!(links[0].id, links[2].id);
    assert_eq!(registry.list_by_owner("alice").await.unwrap().len(), 2);

    assert_eq!(registry.delete(&[links[0].id.as_str()], "alice"), 1);
    registry.pipeline().shutdown().await.unwrap();

    assert!(registry.resolve(&links[0].id).await.unwrap().deleted);
    let remaining = registry.list_by_owner("alice").await.unwrap();
    assert_eq!(remaining, vec![links[1].clone()]);

    registry.ping().await.unwrap();
    registry.shutdown().await.unwrap();
}
