use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::StorageError;
use crate::models::preference::{PreferenceInput, UserPreference};

/// One preference row per user; upserted by the user, read by matching.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserPreference>, StorageError>;

    async fn upsert(
        &self,
        user_id: Uuid,
        input: PreferenceInput,
    ) -> Result<UserPreference, StorageError>;
}

pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserPreference>, StorageError> {
        Ok(sqlx::query_as::<_, UserPreference>(
            "SELECT * FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn upsert(
        &self,
        user_id: Uuid,
        input: PreferenceInput,
    ) -> Result<UserPreference, StorageError> {
        let input = input.normalized();
        Ok(sqlx::query_as::<_, UserPreference>(
            r#"
            INSERT INTO user_preferences
                (user_id, keywords, preferred_locations, preferred_contract_types,
                 salary_min, salary_max, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                keywords = EXCLUDED.keywords,
                preferred_locations = EXCLUDED.preferred_locations,
                preferred_contract_types = EXCLUDED.preferred_contract_types,
                salary_min = EXCLUDED.salary_min,
                salary_max = EXCLUDED.salary_max,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&input.keywords)
        .bind(&input.preferred_locations)
        .bind(&input.preferred_contract_types)
        .bind(input.salary_min)
        .bind(input.salary_max)
        .fetch_one(&self.pool)
        .await?)
    }
}
