//! Requires Docker; run with `cargo test -- --ignored`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use urlshort_storage::{Deletion, PostgresBackend, ShortLink, StorageBackend, StorageError};
use urlshort_test_infra::postgres::{PostgresConfig, PostgresServer};

struct Fixture {
    _postgres: PostgresServer,
    backend: PostgresBackend,
}

impl Fixture {
    async fn start() -> Self {
        let postgres = PostgresServer::new(PostgresConfig::builder().build())
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let pool = connect_with_retry(&url).await;

        let backend = PostgresBackend::new(pool);
        backend.bootstrap().await.expect("create schema");

        Self {
            _postgres: postgres,
            backend,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::PgPool {
    let mut last_error = None;

    for _ in 0..20 {
        match PgPoolOptions::new().max_connections(20).connect(url).await {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn link(id: &str, url: &str, owner: &str) -> ShortLink {
    ShortLink::new(id, url, owner)
}

#[tokio::test]
#[ignore = "requires docker"]
async fn insert_and_get_record() {
    let fixture = Fixture::start().await;

    let stored = fixture
        .backend
        .insert(link("abc123", "https://example.com", "owner"))
        .await
        .unwrap();
    assert_eq!(stored, link("abc123", "https://example.com", "owner"));

    let got = fixture.backend.get_by_id("abc123").await.unwrap().unwrap();
    assert_eq!(got.original_url, "https://example.com");
    assert!(!got.deleted);
    assert!(fixture.backend.get_by_id("missing").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn bootstrap_is_idempotent() {
    let fixture = Fixture::start().await;
    fixture.backend.bootstrap().await.unwrap();
    fixture.backend.ping().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn duplicate_url_returns_existing_row() {
    let fixture = Fixture::start().await;

    fixture
        .backend
        .insert(link("first", "https://example.com", ""))
        .await
        .unwrap();
    let err = fixture
        .backend
        .insert(link("second", "https://example.com", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::AlreadyExists(existing) if existing.id == "first"));
    assert!(fixture.backend.get_by_id("second").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn reused_id_is_a_collision() {
    let fixture = Fixture::start().await;

    fixture
        .backend
        .insert(link("abc123", "https://one.example", ""))
        .await
        .unwrap();
    let err = fixture
        .backend
        .insert(link("abc123", "https://two.example", ""))
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::IdCollision(_)));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_inserts_of_same_url_have_one_winner() {
    let fixture = Fixture::start().await;
    let backend = Arc::new(fixture.backend.clone());

    let mut handles = vec![];
    for i in 0..10 {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            match backend
                .insert(link(&format!("race{i:02}"), "https://race.example", ""))
                .await
            {
                Ok(stored) => (true, stored.id),
                Err(StorageError::AlreadyExists(existing)) => (false, existing.id),
                Err(err) => panic!("unexpected error: {err}"),
            }
        }));
    }

    let mut winners = 0;
    let mut ids = HashSet::new();
    for handle in handles {
        let (won, id) = handle.await.unwrap();
        winners += usize::from(won);
        ids.insert(id);
    }

    assert_eq!(winners, 1);
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn insert_many_skips_duplicates_in_one_transaction() {
    let fixture = Fixture::start().await;

    fixture
        .backend
        .insert(link("old", "https://a.example", ""))
        .await
        .unwrap();
    fixture
        .backend
        .insert_many(vec![
            link("new1", "https://a.example", ""),
            link("new2", "https://b.example", ""),
            link("new3", "https://b.example", ""),
        ])
        .await
        .unwrap();

    assert!(fixture.backend.get_by_id("new1").await.unwrap().is_none());
    let canonical = fixture
        .backend
        .get_by_original_url("https://b.example")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(canonical.id, "new2");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn insert_many_rolls_back_on_id_collision() {
    let fixture = Fixture::start().await;

    fixture
        .backend
        .insert(link("taken", "https://a.example", ""))
        .await
        .unwrap();
    let err = fixture
        .backend
        .insert_many(vec![
            link("fresh", "https://b.example", ""),
            link("taken", "https://c.example", ""),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::IdCollision(_)));
    assert!(fixture.backend.get_by_id("fresh").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn tag_deleted_is_soft_and_owner_scoped() {
    let fixture = Fixture::start().await;

    fixture
        .backend
        .insert(link("mine", "https://mine.example", "alice"))
        .await
        .unwrap();
    fixture
        .backend
        .insert(link("hers", "https://hers.example", "carol"))
        .await
        .unwrap();

    fixture
        .backend
        .tag_deleted(&[
            Deletion::new("alice", "mine"),
            Deletion::new("alice", "hers"),
            Deletion::new("alice", "missing"),
        ])
        .await
        .unwrap();

    let mine = fixture.backend.get_by_id("mine").await.unwrap().unwrap();
    assert!(mine.deleted);
    let hers = fixture.backend.get_by_id("hers").await.unwrap().unwrap();
    assert!(!hers.deleted);

    assert!(fixture.backend.get_by_owner("alice").await.unwrap().is_empty());
    assert_eq!(fixture.backend.get_by_owner("carol").await.unwrap().len(), 1);

    // A deleted url can be shortened again.
    fixture
        .backend
        .insert(link("again", "https://mine.example", "alice"))
        .await
        .unwrap();
}
