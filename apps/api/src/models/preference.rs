use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPreference {
    pub user_id: Uuid,
    pub keywords: Vec<String>,
    pub preferred_locations: Vec<String>,
    pub preferred_contract_types: Vec<String>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// User-supplied preference fields. Missing lists default to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceInput {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub preferred_locations: Vec<String>,
    #[serde(default)]
    pub preferred_contract_types: Vec<String>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
}

impl PreferenceInput {
    /// Trims every list entry and drops blanks.
    pub fn normalized(self) -> Self {
        Self {
            keywords: clean_list(self.keywords),
            preferred_locations: clean_list(self.preferred_locations),
            preferred_contract_types: clean_list(self.preferred_contract_types),
            ..self
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
