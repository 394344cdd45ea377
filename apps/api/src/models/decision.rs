use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A swipe. Requests carry `swiped_right` / `swiped_left`; storage uses
/// `accepted` / `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeAction {
    #[serde(alias = "swiped_right")]
    Accepted,
    #[serde(alias = "swiped_left")]
    Rejected,
}

impl SwipeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeAction::Accepted => "accepted",
            SwipeAction::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SwipeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwipeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" | "swiped_right" => Ok(SwipeAction::Accepted),
            "rejected" | "swiped_left" => Ok(SwipeAction::Rejected),
            other => Err(format!("unknown swipe action '{other}'")),
        }
    }
}

/// Latest decision for a `(user_id, job_id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DecisionRow {
    pub user_id: Uuid,
    pub job_id: Uuid,
    pub action: String,
    pub decided_at: DateTime<Utc>,
}

/// What an upsert did to the decision row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionChange {
    pub action: SwipeAction,
    /// False when the same action was already stored (a re-submission).
    pub changed: bool,
}

impl DecisionChange {
    /// True only when this write moved the row into `accepted`.
    pub fn is_accept_transition(&self) -> bool {
        self.changed && self.action == SwipeAction::Accepted
    }
}

/// An accepted decision joined with its posting, for the applications view.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AcceptedJobRow {
    pub job_id: Uuid,
    pub title: String,
    pub company: String,
    pub location: String,
    pub decided_at: DateTime<Utc>,
}
