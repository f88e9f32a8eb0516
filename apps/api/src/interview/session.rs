//! Final-round chat sessions: lifecycle, transcript, scripted fallback.
//!
//! A session is opened lazily when an application first routes into the
//! final round, seeded with a personalized AI greeting. Chat turns append
//! the user entry first and the AI entry second, oracle or not, so the
//! transcript is always complete.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::clip;
use crate::models::application::ApplicationRow;
use crate::models::job::JobContext;
use crate::models::session::{
    append_log, find_active_session, load_transcript, SessionRow, TranscriptRole, TranscriptRow,
};
use crate::oracle::Oracle;

/// ACTIVE sessions idle for longer than this are swept to ABANDONED the
/// next time the candidate routes through the interview flow.
const SESSION_IDLE_HOURS: i64 = 24;

/// Scripted interview served when the oracle is unavailable. One entry per
/// completed user/AI exchange.
pub const INTERVIEW_SCRIPT: [&str; 6] = [
    "Hello! I am ready to evaluate your technical skills. Could you briefly introduce yourself and your relevant experience?",
    "Thank you. Could you describe the most challenging technical project you've worked on recently?",
    "That sounds interesting. What specific technical difficulties did you face during that project and how did you overcome them?",
    "Moving on to your core skills: How do you approach debugging a complex issue in a production environment?",
    "Great. One final question: How do you handle disagreements with team members regarding technical decisions?",
    "Thank you for your responses. I have gathered enough information. Please click 'End Interview' to finish.",
];

/// Returned once the script is exhausted.
pub const CLOSING_MESSAGE: &str = "I have completed my assessment. You may now end the interview.";

/// Picks the scripted reply for the current exchange. `prior_log_count` is
/// the transcript length before the new user message is appended; each
/// user/AI pair advances the script by one.
pub fn scripted_reply(prior_log_count: usize) -> &'static str {
    let turn = prior_log_count / 2;
    INTERVIEW_SCRIPT.get(turn).copied().unwrap_or(CLOSING_MESSAGE)
}

/// Opening AI greeting, personalized with the candidate's email prefix.
pub fn greeting(candidate_email: &str, job: &JobContext) -> String {
    let user_name = candidate_email.split('@').next().unwrap_or(candidate_email);
    format!(
        "Hello {user_name}, I am the AI Recruiter for {}. I'll be conducting your final interview for the {} position today. Are you ready to begin?",
        job.company_name, job.title
    )
}

/// Returns the application's ACTIVE session, creating and seeding one with
/// the AI greeting if none exists. Stale sessions are swept first.
pub async fn ensure_session(
    pool: &PgPool,
    application: &ApplicationRow,
    job: &JobContext,
    candidate_email: &str,
) -> Result<SessionRow, AppError> {
    abandon_stale_sessions(pool, application.id).await?;

    if let Some(existing) = find_active_session(pool, application.id).await? {
        return Ok(existing);
    }

    // The partial unique index makes concurrent creation race-safe: the
    // losing insert hits the conflict and picks up the winner's row.
    let mut tx = pool.begin().await?;

    let created: Option<SessionRow> = sqlx::query_as(
        "INSERT INTO interview_sessions (id, application_id, status)
         VALUES ($1, $2, 'ACTIVE')
         ON CONFLICT (application_id) WHERE status = 'ACTIVE' DO NOTHING
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(application.id)
    .fetch_optional(&mut *tx)
    .await?;

    let session = match created {
        Some(session) => {
            append_log(
                &mut *tx,
                session.id,
                TranscriptRole::Ai,
                &greeting(candidate_email, job),
            )
            .await?;
            info!(
                "Opened interview session {} for application {}",
                session.id, application.id
            );
            session
        }
        None => {
            tx.rollback().await?;
            return find_active_session(pool, application.id)
                .await?
                .ok_or_else(|| AppError::NotFound("No active interview session".to_string()));
        }
    };

    tx.commit().await?;
    Ok(session)
}

/// Marks ACTIVE sessions with no transcript activity in the idle window as
/// ABANDONED.
async fn abandon_stale_sessions(pool: &PgPool, application_id: Uuid) -> Result<(), AppError> {
    let cutoff = Utc::now() - Duration::hours(SESSION_IDLE_HOURS);

    let swept = sqlx::query(
        "UPDATE interview_sessions s SET status = 'ABANDONED'
         WHERE s.application_id = $1 AND s.status = 'ACTIVE'
           AND s.started_at < $2
           AND NOT EXISTS (
               SELECT 1 FROM interview_logs l
               WHERE l.session_id = s.id AND l.created_at >= $2
           )",
    )
    .bind(application_id)
    .bind(cutoff)
    .execute(pool)
    .await?;

    if swept.rows_affected() > 0 {
        info!(
            "Marked {} stale session(s) abandoned for application {}",
            swept.rows_affected(),
            application_id
        );
    }
    Ok(())
}

/// Builds the chat prompt: a system preamble with job context, the full
/// prior transcript in role-prefixed form, then the new user line.
pub fn build_chat_prompt(
    job: &JobContext,
    transcript: &[TranscriptRow],
    user_message: &str,
) -> String {
    let mut prompt = format!(
        "You are a Recruiter for {}. Job matches keywords: {}...\n\nTranscript:\n",
        job.title,
        clip(&job.description, 100)
    );
    for entry in transcript {
        prompt.push_str(&format!("{}: {}\n", entry.role.label(), entry.content));
    }
    prompt.push_str(&format!("USER: {user_message}\nAI:"));
    prompt
}

/// Handles one chat turn: validates input, appends the user entry, produces
/// the AI reply (oracle or script), appends it, and returns the reply text.
pub async fn post_message(
    pool: &PgPool,
    oracle: &dyn Oracle,
    session: &SessionRow,
    job: &JobContext,
    user_message: &str,
) -> Result<String, AppError> {
    let user_message = user_message.trim();
    if user_message.is_empty() {
        return Err(AppError::Validation("Empty message".to_string()));
    }

    // Script position is computed from the transcript as it stood before
    // this user message, keeping the fallback position deterministic.
    let prior = load_transcript(pool, session.id).await?;
    let prior_count = prior.len();

    append_log(pool, session.id, TranscriptRole::User, user_message).await?;

    let ai_reply = match oracle
        .generate(&build_chat_prompt(job, &prior, user_message))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Chat oracle failed ({e}), serving scripted reply");
            scripted_reply(prior_count).to_string()
        }
    };

    append_log(pool, session.id, TranscriptRole::Ai, &ai_reply).await?;

    Ok(ai_reply)
}

/// Completes the ACTIVE session; the caller then runs the analyzer.
pub async fn complete_session(pool: &PgPool, session: &SessionRow) -> Result<SessionRow, AppError> {
    let completed: Option<SessionRow> = sqlx::query_as(
        "UPDATE interview_sessions SET status = 'COMPLETED', ended_at = now()
         WHERE id = $1 AND status = 'ACTIVE'
         RETURNING *",
    )
    .bind(session.id)
    .fetch_optional(pool)
    .await?;

    completed.ok_or_else(|| AppError::InvalidState("Session is not active".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobContext {
        JobContext {
            title: "Backend Engineer".to_string(),
            description: "Rust services at scale.".to_string(),
            company_name: "Acme".to_string(),
            admin_user_id: None,
        }
    }

    fn entry(id: i64, role: TranscriptRole, content: &str) -> TranscriptRow {
        TranscriptRow {
            id,
            session_id: Uuid::new_v4(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_script_advances_one_question_per_exchange() {
        // Greeting only: first user message gets the first question.
        assert_eq!(scripted_reply(1), INTERVIEW_SCRIPT[0]);
        // Greeting + one exchange.
        assert_eq!(scripted_reply(3), INTERVIEW_SCRIPT[1]);
        assert_eq!(scripted_reply(5), INTERVIEW_SCRIPT[2]);
        assert_eq!(scripted_reply(7), INTERVIEW_SCRIPT[3]);
        assert_eq!(scripted_reply(9), INTERVIEW_SCRIPT[4]);
        assert_eq!(scripted_reply(11), INTERVIEW_SCRIPT[5]);
    }

    #[test]
    fn test_script_repeats_closing_message_when_exhausted() {
        assert_eq!(scripted_reply(13), CLOSING_MESSAGE);
        assert_eq!(scripted_reply(99), CLOSING_MESSAGE);
    }

    #[test]
    fn test_greeting_uses_email_prefix_and_job_context() {
        let text = greeting("jane.doe@example.com", &job());
        assert!(text.contains("Hello jane.doe,"));
        assert!(text.contains("Acme"));
        assert!(text.contains("Backend Engineer"));
    }

    #[test]
    fn test_chat_prompt_is_role_prefixed_and_ends_with_ai_cue() {
        let transcript = vec![
            entry(1, TranscriptRole::Ai, "Welcome!"),
            entry(2, TranscriptRole::User, "Thanks."),
        ];
        let prompt = build_chat_prompt(&job(), &transcript, "I am ready.");
        let ai_pos = prompt.find("AI: Welcome!").unwrap();
        let user_pos = prompt.find("USER: Thanks.").unwrap();
        assert!(ai_pos < user_pos);
        assert!(prompt.ends_with("USER: I am ready.\nAI:"));
    }
}
