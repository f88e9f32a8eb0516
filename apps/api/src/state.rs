use std::sync::Arc;

use sqlx::PgPool;

use crate::oracle::Oracle;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// The AI oracle, injected as a trait object so handlers and tests can
    /// swap the real Gemini client for a stub.
    pub oracle: Arc<dyn Oracle>,
}
