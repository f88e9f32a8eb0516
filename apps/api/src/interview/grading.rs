//! Task grading: the evaluator that scores a candidate's submission and
//! feeds the verdict into the stage gate.
//!
//! Flow: grading prompt → oracle (or fixed fallback) → one transaction
//! covering the task grade, the application mutation and the next stage's
//! task → notices after commit.

use serde::Deserialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::interview::progression::{self, gate};
use crate::interview::tasks::{generate_task_content, insert_task};
use crate::interview::PASS_THRESHOLD;
use crate::models::application::ApplicationRow;
use crate::models::job::JobContext;
use crate::models::task::{TaskRow, TaskStatus};
use crate::oracle::{self, Oracle};

/// Fallback verdict served when the oracle is unreachable or returns
/// unusable output. Always passes: AI downtime never blocks a candidate.
pub const FALLBACK_SCORE: i32 = 85;
pub const FALLBACK_FEEDBACK: &str =
    "Mock Evaluation: Good relevance and clarity. Demonstrated basic understanding of the concepts.";

/// Structured grading result requested from the oracle. The prompt also
/// asks for a `passed` claim, but the gate trusts only the score against
/// the threshold, so the claim is dropped at parse time.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeVerdict {
    pub score: i32,
    pub feedback: String,
}

impl GradeVerdict {
    fn clamped(mut self) -> Self {
        self.score = self.score.clamp(0, 100);
        self
    }
}

pub fn build_grading_prompt(task: &TaskRow, job: &JobContext) -> String {
    format!(
        "Evaluate this candidate's response to the {} Round task.\n\
         Question: {}\n\
         Candidate Answer: {}\n\
         Job: {}\n\n\
         Criteria: Relevance, Depth, Clarity.\n\
         OUTPUT JSON ONLY: {{ \"score\": 0-100, \"feedback\": \"...\", \"passed\": true/false (threshold {PASS_THRESHOLD}) }}",
        task.stage.label(),
        task.content,
        task.response_text.as_deref().unwrap_or(""),
        job.title
    )
}

/// Requests a grade from the oracle; resolves any failure to the fixed
/// fallback verdict.
pub async fn request_grade(oracle: &dyn Oracle, task: &TaskRow, job: &JobContext) -> GradeVerdict {
    let prompt = build_grading_prompt(task, job);
    match oracle::generate_json::<GradeVerdict>(oracle, &prompt).await {
        Ok(verdict) => verdict.clamped(),
        Err(e) => {
            warn!("Task grading oracle failed ({e}), using mock fallback");
            GradeVerdict {
                score: FALLBACK_SCORE,
                feedback: FALLBACK_FEEDBACK.to_string(),
            }
        }
    }
}

/// Grades a submitted task and applies the stage gate. Grading is
/// at-most-once: a task that is not SUBMITTED is rejected, both here and by
/// the conditional UPDATE.
pub async fn grade_submission(
    pool: &PgPool,
    oracle: &dyn Oracle,
    task: &TaskRow,
    application: &ApplicationRow,
    job: &JobContext,
) -> Result<TaskRow, AppError> {
    if task.status != TaskStatus::Submitted {
        return Err(AppError::InvalidState(
            "Only a SUBMITTED task can be graded".to_string(),
        ));
    }

    let verdict = request_grade(oracle, task, job).await;
    let approved = verdict.score >= PASS_THRESHOLD;
    info!(
        "Task {} graded: score={} approved={}",
        task.id, verdict.score, approved
    );

    let outcome = gate(application, approved, Some(verdict.feedback.clone()));

    // Pre-generate the next stage's question so the whole mutation can
    // commit atomically below, without an oracle call inside the
    // transaction.
    let next_task = match outcome.assign_stage {
        Some(stage) => Some((stage, generate_task_content(oracle, stage, job).await)),
        None => None,
    };

    let mut tx = pool.begin().await?;

    let graded: TaskRow = sqlx::query_as(
        "UPDATE tasks SET status = 'GRADED', score = $1, feedback = $2
         WHERE id = $3 AND status = 'SUBMITTED'
         RETURNING *",
    )
    .bind(verdict.score)
    .bind(&verdict.feedback)
    .bind(task.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::InvalidState("Task was already graded".to_string()))?;

    progression::persist_outcome(&mut tx, application.id, &outcome).await?;

    if let Some((stage, content)) = &next_task {
        insert_task(&mut *tx, application.id, *stage, content).await?;
    }

    tx.commit().await?;

    progression::dispatch_notices(pool, job, application.user_id, &outcome).await;

    Ok(graded)
}
