//! Manifest persistence behind a trait, so routes run against PostgreSQL in
//! production and an in-memory map in development and tests.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::{ManifestRecord, NewManifestRecord};

#[async_trait]
pub trait ManifestRepository: Send + Sync {
    /// Stores a record. Returns `false` when the id was already present.
    async fn insert(&self, record: &NewManifestRecord) -> Result<bool, AppError>;

    async fn fetch(&self, id: &str) -> Result<Option<ManifestRecord>, AppError>;

    /// Ids in ascending order, optionally restricted to one kind.
    async fn list_ids(&self, kind: Option<&str>) -> Result<Vec<String>, AppError>;
}

pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ManifestRepository for PostgresRepository {
    async fn insert(&self, record: &NewManifestRecord) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO manifests (id, kind, body, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.kind)
        .bind(&record.body)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch(&self, id: &str) -> Result<Option<ManifestRecord>, AppError> {
        let record = sqlx::query_as::<_, ManifestRecord>(
            "SELECT id, kind, body, created_at, stored_at FROM manifests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_ids(&self, kind: Option<&str>) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = match kind {
            Some(kind) => {
                sqlx::query_as("SELECT id FROM manifests WHERE kind = $1 ORDER BY id")
                    .bind(kind)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT id FROM manifests ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Process-local repository. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryRepository {
    records: RwLock<BTreeMap<String, ManifestRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestRepository for MemoryRepository {
    async fn insert(&self, record: &NewManifestRecord) -> Result<bool, AppError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&record.id) {
            return Ok(false);
        }
        records.insert(
            record.id.clone(),
            ManifestRecord {
                id: record.id.clone(),
                kind: record.kind.clone(),
                body: record.body.clone(),
                created_at: record.created_at,
                stored_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn fetch(&self, id: &str) -> Result<Option<ManifestRecord>, AppError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(id).cloned())
    }

    async fn list_ids(&self, kind: Option<&str>) -> Result<Vec<String>, AppError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .values()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .map(|r| r.id.clone())
            .collect())
    }
}
