use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStage {
    Hr,
    Tech,
}

impl TaskStage {
    /// Short label used in grading prompts ("HR Round", "TECH Round").
    pub fn label(self) -> &'static str {
        match self {
            TaskStage::Hr => "HR",
            TaskStage::Tech => "TECH",
        }
    }
}

/// PENDING → SUBMITTED → GRADED. GRADED is terminal: a task is never
/// re-opened or re-graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Submitted,
    Graded,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TaskRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub stage: TaskStage,
    pub content: String,
    pub response_text: Option<String>,
    pub response_file_name: Option<String>,
    pub status: TaskStatus,
    pub score: i32,
    pub feedback: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub async fn find_pending_task(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<Option<TaskRow>, AppError> {
    let row = sqlx::query_as(
        "SELECT * FROM tasks
         WHERE application_id = $1 AND status = 'PENDING'
         ORDER BY created_at LIMIT 1",
    )
    .bind(application_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn find_latest_task(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<Option<TaskRow>, AppError> {
    let row = sqlx::query_as(
        "SELECT * FROM tasks
         WHERE application_id = $1
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(application_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn stage_task_exists(
    pool: &PgPool,
    application_id: Uuid,
    stage: TaskStage,
) -> Result<bool, AppError> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM tasks WHERE application_id = $1 AND stage = $2)",
    )
    .bind(application_id)
    .bind(stage)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Records the candidate's submission. The conditional WHERE makes this a
/// one-way PENDING → SUBMITTED transition even under a racing double post.
pub async fn mark_submitted(
    pool: &PgPool,
    task_id: Uuid,
    response_text: &str,
    response_file_name: Option<&str>,
) -> Result<TaskRow, AppError> {
    let row: Option<TaskRow> = sqlx::query_as(
        "UPDATE tasks
         SET status = 'SUBMITTED', response_text = $1, response_file_name = $2, submitted_at = now()
         WHERE id = $3 AND status = 'PENDING'
         RETURNING *",
    )
    .bind(response_text)
    .bind(response_file_name)
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| AppError::InvalidState("Task has already been submitted".to_string()))
}
