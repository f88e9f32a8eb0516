use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiDecision {
    Pending,
    Hire,
    Reject,
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptRole {
    Ai,
    User,
    System,
}

impl TranscriptRole {
    /// Role prefix used when flattening a transcript into prompt text.
    pub fn label(self) -> &'static str {
        match self {
            TranscriptRole::Ai => "AI",
            TranscriptRole::User => "USER",
            TranscriptRole::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub status: SessionStatus,
    pub final_score: i32,
    pub ai_decision: AiDecision,
    pub ai_feedback: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One transcript entry. Append-only; the serial id defines the
/// conversation order.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TranscriptRow {
    pub id: i64,
    pub session_id: Uuid,
    pub role: TranscriptRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub async fn find_active_session(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<Option<SessionRow>, AppError> {
    let row = sqlx::query_as(
        "SELECT * FROM interview_sessions
         WHERE application_id = $1 AND status = 'ACTIVE'
         LIMIT 1",
    )
    .bind(application_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn load_transcript<'e>(
    exec: impl PgExecutor<'e>,
    session_id: Uuid,
) -> Result<Vec<TranscriptRow>, AppError> {
    let rows = sqlx::query_as("SELECT * FROM interview_logs WHERE session_id = $1 ORDER BY id")
        .bind(session_id)
        .fetch_all(exec)
        .await?;
    Ok(rows)
}

pub async fn append_log<'e>(
    exec: impl PgExecutor<'e>,
    session_id: Uuid,
    role: TranscriptRole,
    content: &str,
) -> Result<(), AppError> {
    sqlx::query("INSERT INTO interview_logs (session_id, role, content) VALUES ($1, $2, $3)")
        .bind(session_id)
        .bind(role)
        .bind(content)
        .execute(exec)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_labels_match_wire_format() {
        assert_eq!(TranscriptRole::Ai.label(), "AI");
        assert_eq!(TranscriptRole::User.label(), "USER");
        assert_eq!(TranscriptRole::System.label(), "SYSTEM");
    }

    #[test]
    fn test_decision_serializes_screaming_snake() {
        let json = serde_json::to_string(&AiDecision::ManualReview).unwrap();
        assert_eq!(json, "\"MANUAL_REVIEW\"");
    }
}
