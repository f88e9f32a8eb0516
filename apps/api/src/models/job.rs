//! Job context resolution.
//!
//! An application may reference either a current `jobs` posting (owned by an
//! organization) or a legacy `job_adverts` row. Both collapse into a single
//! `JobContext` at the application boundary, so the interview core never
//! branches on the representation.

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::ApplicationRow;

/// Unified view over both job representations.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub title: String,
    pub description: String,
    pub company_name: String,
    /// Sender for system messages. Legacy adverts have no organization and
    /// therefore no admin; notices are skipped for them.
    pub admin_user_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct JobWithOrgRow {
    title: String,
    description: String,
    company_name: String,
    admin_user_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct AdvertRow {
    title: String,
    description: String,
    company_name: String,
}

/// Resolves the job context for an application, preferring the current
/// posting over the legacy advert when both are linked.
pub async fn load_job_context(
    pool: &PgPool,
    application: &ApplicationRow,
) -> Result<JobContext, AppError> {
    if let Some(job_id) = application.job_id {
        return load_current_job(pool, job_id).await;
    }
    if let Some(advert_id) = application.advert_id {
        return load_legacy_advert(pool, advert_id).await;
    }
    Err(AppError::NotFound(format!(
        "Application {} has no job reference",
        application.id
    )))
}

/// Looks a posting up by id directly, trying the current table first and
/// the legacy one second.
pub async fn load_job_by_id(pool: &PgPool, id: Uuid) -> Result<JobContext, AppError> {
    match load_current_job(pool, id).await {
        Err(AppError::NotFound(_)) => load_legacy_advert(pool, id).await,
        other => other,
    }
}

async fn load_current_job(pool: &PgPool, job_id: Uuid) -> Result<JobContext, AppError> {
    let row: Option<JobWithOrgRow> = sqlx::query_as(
        "SELECT j.title, j.description, o.name AS company_name, o.admin_user_id
         FROM jobs j
         JOIN organizations o ON o.id = j.organization_id
         WHERE j.id = $1",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| JobContext {
        title: r.title,
        description: r.description,
        company_name: r.company_name,
        admin_user_id: r.admin_user_id,
    })
    .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))
}

async fn load_legacy_advert(pool: &PgPool, advert_id: Uuid) -> Result<JobContext, AppError> {
    let row: Option<AdvertRow> =
        sqlx::query_as("SELECT title, description, company_name FROM job_adverts WHERE id = $1")
            .bind(advert_id)
            .fetch_optional(pool)
            .await?;

    row.map(|r| JobContext {
        title: r.title,
        description: r.description,
        company_name: r.company_name,
        admin_user_id: None,
    })
    .ok_or_else(|| AppError::NotFound(format!("Job advert {advert_id} not found")))
}
