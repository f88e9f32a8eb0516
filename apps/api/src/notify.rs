//! Messaging and notification collaborators.
//!
//! Notices are emitted after the owning transaction commits; a failure here
//! is logged and never fails the candidate's request.

use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::job::JobContext;

/// Sends a system message to the candidate from the organization's admin
/// account. Silently skipped when no admin is resolvable (legacy adverts
/// have none).
pub async fn send_system_message(pool: &PgPool, job: &JobContext, receiver_id: Uuid, content: &str) {
    let Some(sender_id) = job.admin_user_id else {
        debug!("No organization admin resolvable, skipping system message");
        return;
    };

    let result = sqlx::query(
        "INSERT INTO messages (id, sender_id, receiver_id, content, is_read)
         VALUES ($1, $2, $3, $4, false)",
    )
    .bind(Uuid::new_v4())
    .bind(sender_id)
    .bind(receiver_id)
    .bind(content)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!("Failed to send system message: {e}");
    }
}

/// Fire-and-forget per-user notification.
pub async fn push_notification(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    message: &str,
    link: Option<String>,
) {
    let result = sqlx::query(
        "INSERT INTO notifications (id, user_id, title, message, link, is_read)
         VALUES ($1, $2, $3, $4, $5, false)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(title)
    .bind(message)
    .bind(link)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!("Failed to push notification: {e}");
    }
}
