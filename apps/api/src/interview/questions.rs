//! Recruiter-side question suggestions, three per round. Failures never
//! error out: the recruiter gets an explanatory system string instead.

use tracing::warn;

use crate::interview::clip;
use crate::models::job::JobContext;
use crate::oracle::{Oracle, OracleError};

pub fn build_suggestion_prompt(job: &JobContext, round_type: &str) -> String {
    format!(
        "You are an expert technical recruiter. Generate 3 short, specific, and professional interview questions for a candidate applying for the role of '{}'.\n\n\
         Context:\n\
         - Job Description: {}...\n\n\
         Current Interview Round: {round_type}\n\n\
         Instructions:\n\
         1. If this is the 'HR Round', focus on soft skills and culture fit.\n\
         2. If this is the 'Technical Round', focus on specific technical skills mentioned in the description.\n\
         3. If this is the 'Final Round', focus on long-term goals and salary expectations.\n\
         4. Return ONLY the numbered list of questions. Do not include introductory text.",
        job.title,
        clip(&job.description, 500)
    )
}

/// Suggests interview questions for a round, degrading to a system string
/// the recruiter can act on.
pub async fn suggest_questions(oracle: &dyn Oracle, job: &JobContext, round_type: &str) -> String {
    match oracle.generate(&build_suggestion_prompt(job, round_type)).await {
        Ok(text) => text,
        Err(OracleError::Disabled) => "System Error: AI API key not configured.".to_string(),
        Err(e) => {
            warn!("Question suggestion oracle failed: {e}");
            "System: Could not auto-generate questions. Please type your questions below."
                .to_string()
        }
    }
}
