use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::StorageError;
use crate::models::decision::{AcceptedJobRow, DecisionChange, DecisionRow, SwipeAction};

/// Latest-wins swipe log keyed by `(user_id, job_id)`. No history is kept.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Writes the decision and reports whether the stored action changed.
    /// Must be atomic per key: of two concurrent identical writes, at most one
    /// reports `changed`.
    async fn upsert(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        action: SwipeAction,
    ) -> Result<DecisionChange, StorageError>;

    async fn get(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<DecisionRow>, StorageError>;

    /// Accepted decisions joined with their postings, most recent first.
    async fn accepted_jobs(&self, user_id: Uuid) -> Result<Vec<AcceptedJobRow>, StorageError>;
}

pub struct PgDecisionStore {
    pool: PgPool,
}

impl PgDecisionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DecisionStore for PgDecisionStore {
    async fn upsert(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        action: SwipeAction,
    ) -> Result<DecisionChange, StorageError> {
        // The conditional DO UPDATE returns no row when the stored action is
        // already the requested one; the row lock serialises concurrent writers.
        let written: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO user_job_decisions (user_id, job_id, action, decided_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, job_id) DO UPDATE
                SET action = EXCLUDED.action,
                    decided_at = EXCLUDED.decided_at
                WHERE user_job_decisions.action IS DISTINCT FROM EXCLUDED.action
            RETURNING action
            "#,
        )
        .bind(user_id)
        .bind(job_id)
        .bind(action.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(DecisionChange {
            action,
            changed: written.is_some(),
        })
    }

    async fn get(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<DecisionRow>, StorageError> {
        Ok(sqlx::query_as::<_, DecisionRow>(
            "SELECT * FROM user_job_decisions WHERE user_id = $1 AND job_id = $2",
        )
        .bind(user_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn accepted_jobs(&self, user_id: Uuid) -> Result<Vec<AcceptedJobRow>, StorageError> {
        Ok(sqlx::query_as::<_, AcceptedJobRow>(
            r#"
            SELECT d.job_id, j.title, j.company, j.location, d.decided_at
            FROM user_job_decisions d
            JOIN job_postings j ON j.id = d.job_id
            WHERE d.user_id = $1 AND d.action = 'accepted'
            ORDER BY d.decided_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
