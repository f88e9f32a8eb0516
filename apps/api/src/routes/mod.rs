pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Candidate interview flow
        .route(
            "/api/v1/applications/:id/interview/start",
            post(handlers::handle_start_interview),
        )
        .route(
            "/api/v1/applications/:id/interview/message",
            post(handlers::handle_chat_message),
        )
        .route(
            "/api/v1/applications/:id/interview/end",
            post(handlers::handle_end_interview),
        )
        .route(
            "/api/v1/applications/:id/tasks/current",
            get(handlers::handle_current_task),
        )
        .route(
            "/api/v1/applications/:id/tasks/submit",
            post(handlers::handle_submit_task),
        )
        // Recruiter tooling
        .route(
            "/api/v1/jobs/:id/question-suggestions",
            post(handlers::handle_question_suggestions),
        )
        .with_state(state)
}
