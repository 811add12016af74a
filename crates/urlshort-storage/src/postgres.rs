use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::debug;
use urlshort_core::{Deletion, Result, ShortLink, StorageBackend, StorageError};

/// Schema applied by [`PostgresBackend::bootstrap`](StorageBackend::bootstrap).
pub const SCHEMA: &str = include_str!("../ddl/postgres/short_urls.sql");

const PRIMARY_KEY_CONSTRAINT: &str = "short_urls_pkey";

/// PostgreSQL implementation of the storage contract.
///
/// Dedup relies on a partial unique index over `original_url` for rows that
/// are not deleted. [`insert`] is a single upsert that reports through
/// `xmax = 0` whether the returned row was just inserted, so concurrent
/// creates of the same url cannot race between a check and an insert.
///
/// [`insert`]: StorageBackend::insert
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Creates a backend from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a backend by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    err.as_database_error().and_then(|e| e.constraint())
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

/// Maps a write error, turning primary key violations into `IdCollision`.
fn map_write_error(err: sqlx::Error, id: &str) -> StorageError {
    if is_unique_violation(&err) && violated_constraint(&err) == Some(PRIMARY_KEY_CONSTRAINT) {
        return StorageError::IdCollision(id.to_string());
    }
    map_sqlx_error(err)
}

fn link_from_row(row: &PgRow) -> Result<ShortLink> {
    Ok(ShortLink {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        owner_id: row.try_get("uuid").map_err(map_sqlx_error)?,
        deleted: row.try_get("deleted").map_err(map_sqlx_error)?,
    })
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn bootstrap(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!("short_urls schema is in place");
        Ok(())
    }

    async fn insert(&self, link: ShortLink) -> Result<ShortLink> {
        let row = sqlx::query(
            r#"
            INSERT INTO short_urls (id, original_url, uuid, updated_at, deleted)
            VALUES ($1, $2, $3, NOW(), FALSE)
            ON CONFLICT (original_url) WHERE NOT deleted
            DO UPDATE SET updated_at = NOW()
            RETURNING id, original_url, uuid, deleted, (xmax = 0) AS inserted
            "#,
        )
        .bind(&link.id)
        .bind(&link.original_url)
        .bind(&link.owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_write_error(err, &link.id))?;

        let stored = link_from_row(&row)?;
        let inserted: bool = row.try_get("inserted").map_err(map_sqlx_error)?;

        if inserted {
            Ok(stored)
        } else {
            Err(StorageError::already_exists(stored))
        }
    }

    async fn insert_many(&self, links: Vec<ShortLink>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for link in &links {
            sqlx::query(
                r#"
                INSERT INTO short_urls (id, original_url, uuid, updated_at, deleted)
                VALUES ($1, $2, $3, NOW(), FALSE)
                ON CONFLICT (original_url) WHERE NOT deleted DO NOTHING
                "#,
            )
            .bind(&link.id)
            .bind(&link.original_url)
            .bind(&link.owner_id)
            .execute(&mut *tx)
            .await
            .map_err(|err| map_write_error(err, &link.id))?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ShortLink>> {
        let row = sqlx::query(
            r#"
            SELECT id, original_url, uuid, deleted
            FROM short_urls
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(link_from_row).transpose()
    }

    async fn get_by_original_url(&self, original_url: &str) -> Result<Option<ShortLink>> {
        let row = sqlx::query(
            r#"
            SELECT id, original_url, uuid, deleted
            FROM short_urls
            WHERE original_url = $1
              AND NOT deleted
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(link_from_row).transpose()
    }

    async fn get_by_owner(&self, owner_id: &str) -> Result<Vec<ShortLink>> {
        let rows = sqlx::query(
            r#"
            SELECT id, original_url, uuid, deleted
            FROM short_urls
            WHERE uuid = $1
              AND NOT deleted
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(link_from_row).collect()
    }

    async fn tag_deleted(&self, deletions: &[Deletion]) -> Result<()> {
        if deletions.is_empty() {
            return Ok(());
        }

        let (ids, owners): (Vec<&str>, Vec<&str>) = deletions
            .iter()
            .map(|d| (d.link_id.as_str(), d.owner_id.as_str()))
            .unzip();

        let result = sqlx::query(
            r#"
            UPDATE short_urls AS s
            SET deleted = TRUE, updated_at = NOW()
            FROM UNNEST($1::varchar[], $2::varchar[]) AS d(id, uuid)
            WHERE s.id = d.id
              AND s.uuid = d.uuid
              AND NOT s.deleted
            "#,
        )
        .bind(&ids)
        .bind(&owners)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(
            requested = deletions.len(),
            tagged = result.rows_affected(),
            "tagged links deleted"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
