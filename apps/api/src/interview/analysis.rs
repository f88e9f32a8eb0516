//! Post-interview analysis: scores a completed session's transcript and
//! applies the hire/reject decision to the application.
//!
//! Fallback is deliberately optimistic (88, HIRE): interview candidates are
//! never blocked on AI downtime. Tasks fall back to 85; the asymmetry is
//! intentional.

use serde::Deserialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::interview::clip;
use crate::models::application::ApplicationRow;
use crate::models::job::JobContext;
use crate::models::session::{load_transcript, AiDecision, SessionRow, TranscriptRow};
use crate::notify;
use crate::oracle::{self, Oracle};

pub const FALLBACK_SCORE: i32 = 88;
pub const FALLBACK_FEEDBACK: &str =
    "Candidate demonstrated strong communication and technical potential during the mock interview.";

const GENERIC_REJECTION: &str =
    "Thank you for your time. Unfortunately we are not moving forward.";

/// Job descriptions are clipped to this many characters in the analysis
/// prompt.
const DESCRIPTION_CLIP: usize = 1000;

/// Raw oracle output for a transcript analysis.
#[derive(Debug, Clone, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    score: i32,
    #[serde(default)]
    decision: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    feedback_message: Option<String>,
}

/// Normalized verdict applied to the session and application.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisVerdict {
    pub score: i32,
    pub decision: AiDecision,
    pub reasoning: String,
    pub feedback_message: Option<String>,
}

/// Maps the oracle's decision string onto a decision; anything unexpected
/// goes to manual review rather than being guessed at.
pub fn parse_decision(raw: &str) -> AiDecision {
    match raw.trim().to_uppercase().as_str() {
        "HIRE" => AiDecision::Hire,
        "REJECT" => AiDecision::Reject,
        _ => AiDecision::ManualReview,
    }
}

pub fn format_transcript(entries: &[TranscriptRow]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.role.label(), e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_analysis_prompt(job: &JobContext, transcript: &str) -> String {
    format!(
        "You are a Senior Hiring Manager. Analyze the following interview transcript for a candidate.\n\
         Job Description: {}\n\n\
         TRANSCRIPT:\n{transcript}\n\n\
         TASK:\n\
         1. Score the candidate from 0-100 based on technical skills, communication, and fit.\n\
         2. Make a hiring recommendation: 'HIRE' (Move to next round) or 'REJECT'.\n\
         3. Provide a brief breakdown of pros/cons.\n\
         4. Compose a short feedback message for the candidate.\n\n\
         OUTPUT FORMAT (JSON ONLY):\n\
         {{\n  \"score\": 85,\n  \"decision\": \"HIRE\" or \"REJECT\",\n  \"reasoning\": \"Strong python skills...\",\n  \"feedback_message\": \"We were impressed by...\"\n}}",
        clip(&job.description, DESCRIPTION_CLIP)
    )
}

pub fn fallback_verdict() -> AnalysisVerdict {
    AnalysisVerdict {
        score: FALLBACK_SCORE,
        decision: AiDecision::Hire,
        reasoning: FALLBACK_FEEDBACK.to_string(),
        feedback_message: None,
    }
}

/// Runs the analysis for a just-completed session: oracle (or fallback)
/// verdict, atomic session-plus-application update, then notices.
pub async fn analyze_session(
    pool: &PgPool,
    oracle: &dyn Oracle,
    session: &SessionRow,
    application: &ApplicationRow,
    job: &JobContext,
) -> Result<AnalysisVerdict, AppError> {
    let transcript = load_transcript(pool, session.id).await?;
    let prompt = build_analysis_prompt(job, &format_transcript(&transcript));

    let verdict = match oracle::generate_json::<RawAnalysis>(oracle, &prompt).await {
        Ok(raw) => AnalysisVerdict {
            score: raw.score.clamp(0, 100),
            decision: parse_decision(&raw.decision),
            reasoning: raw.reasoning,
            feedback_message: raw.feedback_message,
        },
        Err(e) => {
            warn!("Interview analysis oracle failed ({e}), using optimistic fallback");
            fallback_verdict()
        }
    };

    info!(
        "Session {} analyzed: score={} decision={:?}",
        session.id, verdict.score, verdict.decision
    );

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE interview_sessions SET final_score = $1, ai_decision = $2, ai_feedback = $3
         WHERE id = $4",
    )
    .bind(verdict.score)
    .bind(verdict.decision)
    .bind(&verdict.reasoning)
    .bind(session.id)
    .execute(&mut *tx)
    .await?;

    // Mirror the score onto the application; status and stage follow the
    // decision. MANUAL_REVIEW leaves both for a human.
    match verdict.decision {
        AiDecision::Hire => {
            sqlx::query(
                "UPDATE applications
                 SET ai_score = $1, status = 'ACCEPTED', interview_stage = 'HIRED'
                 WHERE id = $2",
            )
            .bind(verdict.score)
            .bind(application.id)
            .execute(&mut *tx)
            .await?;
        }
        AiDecision::Reject => {
            sqlx::query("UPDATE applications SET ai_score = $1, status = 'REJECTED' WHERE id = $2")
                .bind(verdict.score)
                .bind(application.id)
                .execute(&mut *tx)
                .await?;
        }
        _ => {
            sqlx::query("UPDATE applications SET ai_score = $1 WHERE id = $2")
                .bind(verdict.score)
                .bind(application.id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;

    match verdict.decision {
        AiDecision::Hire => {
            notify::push_notification(
                pool,
                application.user_id,
                "Interview Passed! 🎉",
                &format!(
                    "You successfully passed the AI Interview. Score: {}/100.",
                    verdict.score
                ),
                Some(format!("/applications/{}/interview", application.id)),
            )
            .await;
        }
        AiDecision::Reject => {
            let content = verdict
                .feedback_message
                .clone()
                .unwrap_or_else(|| GENERIC_REJECTION.to_string());
            notify::send_system_message(pool, job, application.user_id, &content).await;
        }
        _ => {}
    }

    Ok(verdict)
}
