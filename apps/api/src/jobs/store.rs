//! Job Store: persistent postings keyed by `(source, source_id)`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::StorageError;
use crate::models::job::{JobPosting, JobStats, NewJobPosting, UpsertOutcome};

/// Storage contract for postings. Carried in `AppState` as `Arc<dyn JobStore>`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts only if no row exists with the same `(source, source_id)`.
    /// A duplicate is reported as `inserted: false` with the existing id.
    async fn upsert_if_absent(&self, posting: &NewJobPosting)
        -> Result<UpsertOutcome, StorageError>;

    /// Active postings whose title or description contains any keyword
    /// (case-insensitive), newest first. Empty `keywords` browses the most
    /// recent active postings.
    async fn search(&self, keywords: &[String], limit: i64)
        -> Result<Vec<JobPosting>, StorageError>;

    /// Unfiltered pagination over active postings, newest first.
    async fn list_page(&self, offset: i64, limit: i64) -> Result<Vec<JobPosting>, StorageError>;

    async fn get(&self, id: Uuid) -> Result<Option<JobPosting>, StorageError>;

    async fn stats(&self) -> Result<JobStats, StorageError>;
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_id_by_key(&self, source: &str, source_id: &str) -> Result<Option<Uuid>, StorageError> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM job_postings WHERE source = $1 AND source_id = $2",
        )
        .bind(source)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn upsert_if_absent(
        &self,
        posting: &NewJobPosting,
    ) -> Result<UpsertOutcome, StorageError> {
        let row: Option<(Uuid, bool)> = sqlx::query_as(
            r#"
            WITH ins AS (
                INSERT INTO job_postings
                    (id, title, company, location, description, application_url, source, source_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (source, source_id) DO NOTHING
                RETURNING id
            )
            SELECT id, TRUE FROM ins
            UNION ALL
            SELECT id, FALSE FROM job_postings WHERE source = $7 AND source_id = $8
            LIMIT 1
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&posting.title)
        .bind(&posting.company)
        .bind(&posting.location)
        .bind(&posting.description)
        .bind(&posting.application_url)
        .bind(&posting.source)
        .bind(&posting.source_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id, inserted)) = row {
            return Ok(UpsertOutcome { inserted, id });
        }

        // A concurrent run committed the same key after this statement's snapshot.
        let id = self
            .find_id_by_key(&posting.source, &posting.source_id)
            .await?
            .ok_or_else(|| {
                StorageError::Transient(format!(
                    "posting {}/{} neither inserted nor found",
                    posting.source, posting.source_id
                ))
            })?;
        Ok(UpsertOutcome {
            inserted: false,
            id,
        })
    }

    async fn search(
        &self,
        keywords: &[String],
        limit: i64,
    ) -> Result<Vec<JobPosting>, StorageError> {
        let patterns = like_patterns(keywords);
        Ok(sqlx::query_as::<_, JobPosting>(
            r#"
            SELECT *
            FROM job_postings
            WHERE is_active
              AND (cardinality($1::text[]) = 0
                   OR title ILIKE ANY($1)
                   OR description ILIKE ANY($1))
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(&patterns)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_page(&self, offset: i64, limit: i64) -> Result<Vec<JobPosting>, StorageError> {
        Ok(sqlx::query_as::<_, JobPosting>(
            "SELECT * FROM job_postings WHERE is_active ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobPosting>, StorageError> {
        Ok(
            sqlx::query_as::<_, JobPosting>("SELECT * FROM job_postings WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn stats(&self) -> Result<JobStats, StorageError> {
        Ok(sqlx::query_as::<_, JobStats>(
            "SELECT COUNT(*) AS jobs, MAX(created_at) AS last_added FROM job_postings",
        )
        .fetch_one(&self.pool)
        .await?)
    }
}

/// Trimmed, non-blank keywords.
pub fn clean_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// `%keyword%` ILIKE patterns with LIKE metacharacters escaped.
pub fn like_patterns(keywords: &[String]) -> Vec<String> {
    clean_keywords(keywords)
        .iter()
        .map(|k| {
            let escaped = k
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        })
        .collect()
}
