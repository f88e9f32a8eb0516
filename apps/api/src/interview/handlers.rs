//! HTTP surface of the interview core. Authentication happens upstream;
//! handlers receive the caller's user id and only check ownership.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::{analysis, grading, progression, questions, session};
use crate::models::application::{get_application, ApplicationRow};
use crate::models::job::{load_job_by_id, load_job_context, JobContext};
use crate::models::session::{find_active_session, AiDecision};
use crate::models::task::{find_pending_task, mark_submitted, TaskRow};
use crate::notify;
use crate::state::AppState;

/// Identifies the authenticated caller.
#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

/// The owning candidate and the posting organization's admin may view the
/// routing step; everyone else is rejected.
fn authorize_participant(
    application: &ApplicationRow,
    job: &JobContext,
    user_id: Uuid,
) -> Result<(), AppError> {
    if application.user_id == user_id || job.admin_user_id == Some(user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Candidate-only routes. Task answers and interview turns must come from
/// the owning candidate; an org admin acting here would trigger grading or
/// analysis on the candidate's behalf.
fn authorize_owner(application: &ApplicationRow, user_id: Uuid) -> Result<(), AppError> {
    if application.user_id == user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

async fn candidate_email(pool: &PgPool, user_id: Uuid) -> Result<String, AppError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    row.map(|(email,)| email)
        .ok_or_else(|| AppError::NotFound("Candidate account not found".to_string()))
}

#[derive(Serialize)]
pub struct StartResponse {
    pub destination: progression::Destination,
}

/// POST /api/v1/applications/:id/interview/start
pub async fn handle_start_interview(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<StartResponse>, AppError> {
    let application = get_application(&state.db, application_id).await?;
    let job = load_job_context(&state.db, &application).await?;
    authorize_participant(&application, &job, params.user_id)?;

    let email = candidate_email(&state.db, application.user_id).await?;
    let destination = progression::resolve_next_step(
        &state.db,
        state.oracle.as_ref(),
        application,
        &job,
        &email,
    )
    .await?;

    Ok(Json(StartResponse { destination }))
}

/// GET /api/v1/applications/:id/tasks/current
pub async fn handle_current_task(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<TaskRow>, AppError> {
    let application = get_application(&state.db, application_id).await?;
    authorize_owner(&application, params.user_id)?;

    let task = find_pending_task(&state.db, application.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No pending task".to_string()))?;

    Ok(Json(task))
}

#[derive(Deserialize)]
pub struct SubmitTaskRequest {
    pub response_text: String,
    pub response_file_name: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitTaskResponse {
    pub task: TaskRow,
    pub application: ApplicationRow,
}

/// POST /api/v1/applications/:id/tasks/submit
///
/// Submits the PENDING task, grades it (oracle or fallback) and applies the
/// stage gate in one atomic mutation.
pub async fn handle_submit_task(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<Json<SubmitTaskResponse>, AppError> {
    let application = get_application(&state.db, application_id).await?;
    let job = load_job_context(&state.db, &application).await?;
    authorize_owner(&application, params.user_id)?;

    if application.status.is_terminal() {
        return Err(AppError::InvalidState(
            "Application has already been decided".to_string(),
        ));
    }

    if req.response_text.trim().is_empty() {
        return Err(AppError::Validation("Empty task response".to_string()));
    }

    let pending = find_pending_task(&state.db, application.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No pending task".to_string()))?;

    let submitted = mark_submitted(
        &state.db,
        pending.id,
        req.response_text.trim(),
        req.response_file_name.as_deref(),
    )
    .await?;

    let graded = grading::grade_submission(
        &state.db,
        state.oracle.as_ref(),
        &submitted,
        &application,
        &job,
    )
    .await?;

    let application = get_application(&state.db, application.id).await?;
    Ok(Json(SubmitTaskResponse {
        task: graded,
        application,
    }))
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub ai_message: String,
}

/// POST /api/v1/applications/:id/interview/message
pub async fn handle_chat_message(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let application = get_application(&state.db, application_id).await?;
    let job = load_job_context(&state.db, &application).await?;
    authorize_owner(&application, params.user_id)?;

    let active = find_active_session(&state.db, application.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No active interview session".to_string()))?;

    let ai_message = session::post_message(
        &state.db,
        state.oracle.as_ref(),
        &active,
        &job,
        &req.message,
    )
    .await?;

    Ok(Json(ChatResponse { ai_message }))
}

#[derive(Serialize)]
pub struct EndInterviewResponse {
    pub session_id: Uuid,
    pub final_score: i32,
    pub decision: AiDecision,
    pub application: ApplicationRow,
}

/// POST /api/v1/applications/:id/interview/end
///
/// Completes the ACTIVE session and runs the transcript analysis, which
/// applies the hire/reject decision to the application.
pub async fn handle_end_interview(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<EndInterviewResponse>, AppError> {
    let application = get_application(&state.db, application_id).await?;
    let job = load_job_context(&state.db, &application).await?;
    authorize_owner(&application, params.user_id)?;

    let active = find_active_session(&state.db, application.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No active interview session".to_string()))?;

    let completed = session::complete_session(&state.db, &active).await?;
    let verdict = analysis::analyze_session(
        &state.db,
        state.oracle.as_ref(),
        &completed,
        &application,
        &job,
    )
    .await?;

    notify::send_system_message(
        &state.db,
        &job,
        application.user_id,
        "Interview completed! Our system is analyzing your responses. You will be notified shortly.",
    )
    .await;

    let application = get_application(&state.db, application.id).await?;
    Ok(Json(EndInterviewResponse {
        session_id: completed.id,
        final_score: verdict.score,
        decision: verdict.decision,
        application,
    }))
}

#[derive(Deserialize)]
pub struct SuggestionRequest {
    pub round_type: String,
}

#[derive(Serialize)]
pub struct SuggestionResponse {
    pub questions: String,
}

/// POST /api/v1/jobs/:id/question-suggestions
pub async fn handle_question_suggestions(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<SuggestionRequest>,
) -> Result<Json<SuggestionResponse>, AppError> {
    let job = load_job_by_id(&state.db, job_id).await?;
    let questions =
        questions::suggest_questions(state.oracle.as_ref(), &job, &req.round_type).await;
    Ok(Json(SuggestionResponse { questions }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::application::{ApplicationStatus, InterviewStage};

    fn application(owner: Uuid) -> ApplicationRow {
        ApplicationRow {
            id: Uuid::new_v4(),
            user_id: owner,
            job_id: Some(Uuid::new_v4()),
            advert_id: None,
            status: ApplicationStatus::Interviewing,
            interview_stage: InterviewStage::HrRound,
            ai_score: 0,
            created_at: Utc::now(),
        }
    }

    fn job(admin: Option<Uuid>) -> JobContext {
        JobContext {
            title: "Backend Engineer".to_string(),
            description: "Rust services.".to_string(),
            company_name: "Acme".to_string(),
            admin_user_id: admin,
        }
    }

    #[test]
    fn test_participant_check_admits_owner_and_org_admin() {
        let owner = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let app = application(owner);
        let j = job(Some(admin));

        assert!(authorize_participant(&app, &j, owner).is_ok());
        assert!(authorize_participant(&app, &j, admin).is_ok());
        assert!(matches!(
            authorize_participant(&app, &j, Uuid::new_v4()),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn test_owner_check_rejects_org_admin() {
        // The admin may view the routing step but must never submit answers,
        // chat, or end the interview in the candidate's place.
        let owner = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let app = application(owner);

        assert!(authorize_owner(&app, owner).is_ok());
        assert!(matches!(
            authorize_owner(&app, admin),
            Err(AppError::Forbidden)
        ));
    }
}
