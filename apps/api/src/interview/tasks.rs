//! Task generation: produces the HR/TECH question for an application.
//!
//! Oracle-first: a stage-specific prompt embedding the job title and a
//! clipped description. On any oracle failure the deterministic keyword
//! classifier takes over, so task assignment never fails outward.

use sqlx::{PgExecutor, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{conflict_to_invalid_state, AppError};
use crate::interview::clip;
use crate::models::job::JobContext;
use crate::models::task::{TaskRow, TaskStage};
use crate::oracle::Oracle;

/// Job descriptions are clipped to this many characters in task prompts.
const DESCRIPTION_CLIP: usize = 500;

pub fn build_task_prompt(stage: TaskStage, job: &JobContext) -> String {
    let desc = clip(&job.description, DESCRIPTION_CLIP);
    match stage {
        TaskStage::Hr => format!(
            "Generate a single, comprehensive HR Screening Question for a candidate applying for {}.\n\
             Job Desc: {desc}...\n\
             Focus on: Cultural fit, motivation, or key soft skills.\n\
             Output just the question text.",
            job.title
        ),
        TaskStage::Tech => format!(
            "Generate a Technical Challenge/Question for a candidate applying for {}.\n\
             Job Desc: {desc}...\n\
             Focus on: A specific coding problem or scenario analysis related to the skills required.\n\
             Output just the question text.",
            job.title
        ),
    }
}

/// Deterministic question generator used when the oracle is unavailable.
///
/// Rules are matched top to bottom against the lower-cased description plus
/// title; the first hit wins. The rule order is load-bearing: identical
/// inputs must always yield the identical question.
pub fn fallback_question(stage: TaskStage, job: &JobContext) -> String {
    let combined = format!(
        "{} {}",
        job.description.to_lowercase(),
        job.title.to_lowercase()
    );
    let has = |words: &[&str]| words.iter().any(|w| combined.contains(w));

    match stage {
        TaskStage::Hr => {
            let question = if has(&["manager", "lead"]) {
                "Describe a time you had to lead a difficult project. How did you manage resources and timelines?"
            } else if has(&["sales", "marketing"]) {
                "Sell me a product you used recently. What makes it unique?"
            } else if has(&["customer", "support"]) {
                "Tell me about a time you turned a negative customer experience into a positive one."
            } else {
                "Describe a challenge you faced in your last role and how you overcame it."
            };
            question.to_string()
        }
        TaskStage::Tech => {
            // Web development
            let question = if has(&["django", "python"]) {
                "Scenario: You have a slow Django API endpoint. Describe your step-by-step approach to identify the bottleneck and optimize it."
            } else if has(&["react", "frontend", "javascript"]) {
                "Explain how you would architect a large-scale React application. How do you handle State Management and Performance?"
            } else if has(&["node", "express"]) {
                "Explain the Event Loop in Node.js. How do you handle CPU-intensive tasks without blocking the main thread?"
            // Mobile
            } else if has(&["flutter", "dart"]) {
                "Explain the difference between Stateless and Stateful widgets in Flutter. When would you use Provider vs Riverpod?"
            } else if has(&["android", "kotlin"]) {
                "Describe the Activity Lifecycle in Android. How do you handle configuration changes like screen rotation?"
            } else if has(&["ios", "swift"]) {
                "Explain Automatic Reference Counting (ARC) in Swift. How do you prevent strong reference cycles?"
            // Data & AI
            } else if has(&["data", "sql", "analyst"]) {
                "Write a SQL query to find the top 3 highest-paid employees in each department."
            } else if has(&["machine learning", "ai"]) {
                "Explain the Bias-Variance tradeoff. How do you prevent overfitting in a model?"
            // Design
            } else if has(&["design", "ui", "ux"]) {
                "Critique the UX of a popular app (e.g., Spotify, Uber). What specifically would you improve and why?"
            // QA / testing
            } else if has(&["qa", "test", "selenium"]) {
                "Describe a critical bug you found in production. How did you report, track, and verify the fix?"
            // DevOps
            } else if has(&["docker", "kubernetes", "aws"]) {
                "Describe how you would set up a CI/CD pipeline for a microservices architecture."
            } else {
                return format!(
                    "Based on the requirements for the {} role, describe the most complex technical challenge you have solved relevant to this position.",
                    job.title
                );
            };
            question.to_string()
        }
    }
}

/// Produces the question text for a stage. Never fails outward.
pub async fn generate_task_content(
    oracle: &dyn Oracle,
    stage: TaskStage,
    job: &JobContext,
) -> String {
    let prompt = build_task_prompt(stage, job);
    match oracle.generate(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Oracle unavailable for task generation ({e}), using keyword fallback");
            fallback_question(stage, job)
        }
    }
}

/// Persists a new PENDING task. The partial unique index rejects a second
/// PENDING task for the same (application, stage); callers are expected to
/// have checked first, so a conflict is reported as an invalid state.
pub async fn insert_task<'e>(
    exec: impl PgExecutor<'e>,
    application_id: Uuid,
    stage: TaskStage,
    content: &str,
) -> Result<TaskRow, AppError> {
    sqlx::query_as(
        "INSERT INTO tasks (id, application_id, stage, content, status)
         VALUES ($1, $2, $3, $4, 'PENDING')
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(application_id)
    .bind(stage)
    .bind(content)
    .fetch_one(exec)
    .await
    .map_err(|e| conflict_to_invalid_state(e, "A pending task already exists for this stage"))
}

/// Generates and persists the task for a stage in one step. The oracle
/// round trip happens before any row is touched.
pub async fn assign_task(
    pool: &PgPool,
    oracle: &dyn Oracle,
    application_id: Uuid,
    stage: TaskStage,
    job: &JobContext,
) -> Result<TaskRow, AppError> {
    let content = generate_task_content(oracle, stage, job).await;
    let task = insert_task(pool, application_id, stage, &content).await?;
    info!(
        "Assigned {} task {} to application {}",
        stage.label(),
        task.id,
        application_id
    );
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::oracle::OracleError;

    struct DownOracle;

    #[async_trait]
    impl Oracle for DownOracle {
        async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            Err(OracleError::Disabled)
        }
    }

    fn job(title: &str, description: &str) -> JobContext {
        JobContext {
            title: title.to_string(),
            description: description.to_string(),
            company_name: "Acme".to_string(),
            admin_user_id: None,
        }
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let j = job("Backend Engineer", "We use Python and Django daily.");
        let a = fallback_question(TaskStage::Tech, &j);
        let b = fallback_question(TaskStage::Tech, &j);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hr_rule_order_manager_wins_over_sales() {
        // "manager" appears before "sales" in the rule list, so a posting
        // matching both gets the leadership question.
        let j = job("Sales Manager", "Lead our sales team to success.");
        let q = fallback_question(TaskStage::Hr, &j);
        assert!(q.starts_with("Describe a time you had to lead"));
    }

    #[test]
    fn test_hr_generic_question_when_nothing_matches() {
        let j = job("Horticulturist", "Tend the greenhouse.");
        let q = fallback_question(TaskStage::Hr, &j);
        assert_eq!(
            q,
            "Describe a challenge you faced in your last role and how you overcame it."
        );
    }

    #[test]
    fn test_tech_rule_order_django_wins_over_react() {
        let j = job("Fullstack Dev", "Python backend with a React frontend.");
        let q = fallback_question(TaskStage::Tech, &j);
        assert!(q.contains("Django API endpoint"));
    }

    #[test]
    fn test_tech_branches_match_their_keywords() {
        let cases: [(&str, &str); 5] = [
            ("Mobile Engineer", "Flutter and Dart experience required."),
            ("Data Analyst", "Strong SQL skills."),
            ("ML Engineer", "machine learning pipelines"),
            ("Product Designer", "Figma, UI and UX polish."),
            ("Platform Engineer", "Docker and Kubernetes clusters."),
        ];
        let expected_fragments = [
            "Stateless and Stateful widgets",
            "SQL query",
            "Bias-Variance tradeoff",
            "Critique the UX",
            "CI/CD pipeline",
        ];
        for ((title, desc), fragment) in cases.iter().zip(expected_fragments.iter()) {
            let q = fallback_question(TaskStage::Tech, &job(title, desc));
            assert!(q.contains(fragment), "expected {fragment:?} for {title}");
        }
    }

    #[test]
    fn test_tech_catch_all_names_the_role() {
        let j = job("Underwater Basket Weaver", "Weave baskets underwater.");
        let q = fallback_question(TaskStage::Tech, &j);
        assert!(q.contains("Underwater Basket Weaver"));
    }

    #[test]
    fn test_task_prompt_clips_long_description() {
        let long_desc = "d".repeat(2000);
        let j = job("Engineer", &long_desc);
        let prompt = build_task_prompt(TaskStage::Hr, &j);
        assert!(prompt.contains(&"d".repeat(500)));
        assert!(!prompt.contains(&"d".repeat(501)));
        assert!(prompt.contains("Engineer"));
    }

    #[tokio::test]
    async fn test_generate_content_serves_fallback_when_oracle_down() {
        let j = job("Backend Engineer", "Django services.");
        let content = generate_task_content(&DownOracle, TaskStage::Tech, &j).await;
        assert_eq!(content, fallback_question(TaskStage::Tech, &j));
    }
}
