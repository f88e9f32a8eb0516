use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Applied,
    Interviewing,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    /// ACCEPTED and REJECTED are terminal: nothing may mutate the
    /// application's stage or status afterwards.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Accepted | ApplicationStatus::Rejected
        )
    }
}

/// The ordered interview phases an application passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewStage {
    Pending,
    HrRound,
    TechRound,
    FinalRound,
    Hired,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub job_id: Option<Uuid>,
    pub advert_id: Option<Uuid>,
    pub status: ApplicationStatus,
    pub interview_stage: InterviewStage,
    pub ai_score: i32,
    pub created_at: DateTime<Utc>,
}

pub async fn get_application(pool: &PgPool, id: Uuid) -> Result<ApplicationRow, AppError> {
    let row: Option<ApplicationRow> = sqlx::query_as("SELECT * FROM applications WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(ApplicationStatus::Accepted.is_terminal());
        assert!(ApplicationStatus::Rejected.is_terminal());
        assert!(!ApplicationStatus::Applied.is_terminal());
        assert!(!ApplicationStatus::Interviewing.is_terminal());
    }

    #[test]
    fn test_stage_serializes_screaming_snake() {
        let json = serde_json::to_string(&InterviewStage::HrRound).unwrap();
        assert_eq!(json, "\"HR_ROUND\"");
        let json = serde_json::to_string(&InterviewStage::FinalRound).unwrap();
        assert_eq!(json, "\"FINAL_ROUND\"");
    }
}
