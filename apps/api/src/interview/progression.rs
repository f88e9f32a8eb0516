//! Stage progression: the pure transition function for the application
//! state machine, plus the routing that decides a candidate's next screen.
//!
//! The gate is pure (current state + approval → outcome with effects);
//! persistence and notices are applied separately so the transition logic
//! stays fully testable. Final-round outcomes are decided by the transcript
//! analyzer, never here.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::{session, tasks, PASS_THRESHOLD};
use crate::models::application::{
    get_application, ApplicationRow, ApplicationStatus, InterviewStage,
};
use crate::models::job::JobContext;
use crate::models::task::{find_latest_task, find_pending_task, stage_task_exists, TaskStage, TaskStatus};
use crate::notify;
use crate::oracle::Oracle;

/// Notice to deliver to the candidate once a gate outcome has committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    HrPassed,
    TechPassed,
    Rejected { reason: String },
}

/// Result of running the stage gate: the fields to persist plus the side
/// effects to run after commit. All-`None` means no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOutcome {
    pub status: Option<ApplicationStatus>,
    pub stage: Option<InterviewStage>,
    pub assign_stage: Option<TaskStage>,
    pub notice: Option<Notice>,
}

impl GateOutcome {
    pub fn is_noop(&self) -> bool {
        self.status.is_none() && self.stage.is_none()
    }
}

/// The stage gate. Decides whether the application advances, is rejected,
/// or stays put.
pub fn gate(application: &ApplicationRow, approved: bool, reason: Option<String>) -> GateOutcome {
    // Terminal states are frozen.
    if application.status.is_terminal() {
        return GateOutcome::default();
    }

    if !approved {
        return GateOutcome {
            status: Some(ApplicationStatus::Rejected),
            notice: Some(Notice::Rejected {
                reason: reason.unwrap_or_default(),
            }),
            ..Default::default()
        };
    }

    match application.interview_stage {
        InterviewStage::HrRound => GateOutcome {
            stage: Some(InterviewStage::TechRound),
            assign_stage: Some(TaskStage::Tech),
            notice: Some(Notice::HrPassed),
            ..Default::default()
        },
        InterviewStage::TechRound => GateOutcome {
            stage: Some(InterviewStage::FinalRound),
            notice: Some(Notice::TechPassed),
            ..Default::default()
        },
        // PENDING has no gate; FINAL_ROUND and HIRED belong to the analyzer.
        _ => GateOutcome::default(),
    }
}

/// Applies a gate outcome to the application row inside the caller's
/// transaction.
pub async fn persist_outcome(
    conn: &mut PgConnection,
    application_id: Uuid,
    outcome: &GateOutcome,
) -> Result<(), AppError> {
    if let Some(status) = outcome.status {
        sqlx::query("UPDATE applications SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(application_id)
            .execute(&mut *conn)
            .await?;
    }
    if let Some(stage) = outcome.stage {
        sqlx::query("UPDATE applications SET interview_stage = $1 WHERE id = $2")
            .bind(stage)
            .bind(application_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Delivers the notice attached to an outcome. Runs after commit.
pub async fn dispatch_notices(
    pool: &PgPool,
    job: &JobContext,
    candidate_id: Uuid,
    outcome: &GateOutcome,
) {
    let Some(notice) = &outcome.notice else {
        return;
    };

    let content = match notice {
        Notice::HrPassed => {
            "Congrats! You passed the HR Round. A Technical Task has been assigned to you."
                .to_string()
        }
        Notice::TechPassed => {
            "Excellent work! You've advanced to the Final Interview. Please proceed to the Interview Room."
                .to_string()
        }
        Notice::Rejected { reason } => format!(
            "Thank you for completing the task. Unfortunately, your score ({reason}) did not meet our threshold for this round."
        ),
    };

    notify::send_system_message(pool, job, candidate_id, &content).await;
}

// ────────────────────────────────────────────────────────────────────────────
// Routing ("No Landing Page" policy)
// ────────────────────────────────────────────────────────────────────────────

/// Where the UI should send the candidate next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    TaskForm,
    TaskSubmitted,
    InterviewRoom,
}

/// Routing passes are bounded; a pass only repeats when the gate actually
/// changed state, and the gate cannot advance more times than there are
/// stages.
const MAX_ROUTING_PASSES: usize = 4;

/// Snapshot of the routing inputs for one application, fetched once per
/// pass so the decision itself stays pure.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingSnapshot {
    /// A PENDING task exists.
    pub has_pending_task: bool,
    /// Status and score of the most recently created task, if any.
    pub latest_task: Option<(TaskStatus, i32)>,
    /// A task row (any status) exists for the application's current stage.
    pub stage_task_exists: bool,
}

/// One step of the routing decision.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteStep {
    /// Route to a destination and stop.
    Go(Destination),
    /// Apply the gate outcome, reload the application, route again.
    Advance(GateOutcome),
    /// Ensure an interview session exists, then the interview room.
    OpenSession,
    /// Create the stage task, then the task form.
    AssignTask(TaskStage),
}

/// Decides the candidate's next step from a snapshot, in strict priority
/// order:
///
/// 1. a PENDING task → the task form
/// 2. latest task SUBMITTED → waiting screen; GRADED and passing at an
///    advanceable stage → apply the gate and route again
/// 3. FINAL_ROUND → ensure a session exists, go to the interview room
/// 4. HR/TECH round with no task for that stage → auto-assign, task form
/// 5. decided application → interview room (history/result view)
/// 6. fallback → waiting screen
pub fn route_step(application: &ApplicationRow, snapshot: &RoutingSnapshot) -> RouteStep {
    // 1. An open task always comes first.
    if snapshot.has_pending_task {
        return RouteStep::Go(Destination::TaskForm);
    }

    // 2. Submitted or graded-but-unprocessed tasks.
    if let Some((status, score)) = snapshot.latest_task {
        match status {
            TaskStatus::Submitted => return RouteStep::Go(Destination::TaskSubmitted),
            TaskStatus::Graded if score >= PASS_THRESHOLD => {
                let outcome = gate(application, true, None);
                if !outcome.is_noop() {
                    // Self-correcting advance for a passing grade that
                    // never progressed the stage.
                    return RouteStep::Advance(outcome);
                }
                // A passing grade with nothing left to advance (final
                // round): fall through so the session step takes over.
            }
            TaskStatus::Graded => return RouteStep::Go(Destination::TaskSubmitted),
            TaskStatus::Pending => {} // handled by step 1
        }
    }

    // 3. The final round runs as a chat session.
    if application.interview_stage == InterviewStage::FinalRound {
        return RouteStep::OpenSession;
    }

    // 4. Auto-assign the stage task if it never got created.
    let wanted = match application.interview_stage {
        InterviewStage::HrRound => Some(TaskStage::Hr),
        InterviewStage::TechRound => Some(TaskStage::Tech),
        _ => None,
    };
    if let Some(stage) = wanted {
        if !snapshot.stage_task_exists {
            return RouteStep::AssignTask(stage);
        }
    }

    // 5. Decided applications reuse the room as a result/history view.
    if application.status.is_terminal() {
        return RouteStep::Go(Destination::InterviewRoom);
    }

    // 6. Anything else waits.
    RouteStep::Go(Destination::TaskSubmitted)
}

/// Thin async shell around `route_step`: fetches the snapshot, runs the
/// decided step's side effects, loops only when the gate advanced.
pub async fn resolve_next_step(
    pool: &PgPool,
    oracle: &dyn Oracle,
    mut application: ApplicationRow,
    job: &JobContext,
    candidate_email: &str,
) -> Result<Destination, AppError> {
    for _ in 0..MAX_ROUTING_PASSES {
        let current_stage_task = match application.interview_stage {
            InterviewStage::HrRound => TaskStage::Hr,
            InterviewStage::TechRound => TaskStage::Tech,
            _ => TaskStage::Hr, // unused when the stage has no task
        };
        let snapshot = RoutingSnapshot {
            has_pending_task: find_pending_task(pool, application.id).await?.is_some(),
            latest_task: find_latest_task(pool, application.id)
                .await?
                .map(|t| (t.status, t.score)),
            stage_task_exists: stage_task_exists(pool, application.id, current_stage_task)
                .await?,
        };

        match route_step(&application, &snapshot) {
            RouteStep::Go(destination) => return Ok(destination),
            RouteStep::Advance(outcome) => {
                info!(
                    "Auto-advancing application {} past a passing graded task",
                    application.id
                );
                apply_outcome(pool, oracle, &application, job, &outcome).await?;
                application = get_application(pool, application.id).await?;
            }
            RouteStep::OpenSession => {
                session::ensure_session(pool, &application, job, candidate_email).await?;
                return Ok(Destination::InterviewRoom);
            }
            RouteStep::AssignTask(stage) => {
                tasks::assign_task(pool, oracle, application.id, stage, job).await?;
                return Ok(Destination::TaskForm);
            }
        }
    }

    Ok(Destination::TaskSubmitted)
}

/// Persists a gate outcome atomically (application fields plus the next
/// stage's task, whose content is generated before the transaction opens)
/// and then emits the notice.
pub async fn apply_outcome(
    pool: &PgPool,
    oracle: &dyn Oracle,
    application: &ApplicationRow,
    job: &JobContext,
    outcome: &GateOutcome,
) -> Result<(), AppError> {
    let next_task = match outcome.assign_stage {
        Some(stage) => Some((stage, tasks::generate_task_content(oracle, stage, job).await)),
        None => None,
    };

    let mut tx = pool.begin().await?;
    persist_outcome(&mut tx, application.id, outcome).await?;
    if let Some((stage, content)) = &next_task {
        tasks::insert_task(&mut *tx, application.id, *stage, content).await?;
    }
    tx.commit().await?;

    dispatch_notices(pool, job, application.user_id, outcome).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn app(stage: InterviewStage, status: ApplicationStatus) -> ApplicationRow {
        ApplicationRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            job_id: Some(Uuid::new_v4()),
            advert_id: None,
            status,
            interview_stage: stage,
            ai_score: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_rejection_at_any_gate_is_terminal_without_stage_change() {
        for stage in [InterviewStage::HrRound, InterviewStage::TechRound] {
            let outcome = gate(
                &app(stage, ApplicationStatus::Applied),
                false,
                Some("42".to_string()),
            );
            assert_eq!(outcome.status, Some(ApplicationStatus::Rejected));
            assert_eq!(outcome.stage, None);
            assert_eq!(outcome.assign_stage, None);
            assert_eq!(
                outcome.notice,
                Some(Notice::Rejected {
                    reason: "42".to_string()
                })
            );
        }
    }

    #[test]
    fn test_hr_pass_advances_and_assigns_tech_task() {
        let outcome = gate(
            &app(InterviewStage::HrRound, ApplicationStatus::Applied),
            true,
            None,
        );
        assert_eq!(outcome.stage, Some(InterviewStage::TechRound));
        assert_eq!(outcome.assign_stage, Some(TaskStage::Tech));
        assert_eq!(outcome.notice, Some(Notice::HrPassed));
        assert_eq!(outcome.status, None);
    }

    #[test]
    fn test_tech_pass_advances_to_final_without_task() {
        let outcome = gate(
            &app(InterviewStage::TechRound, ApplicationStatus::Applied),
            true,
            None,
        );
        assert_eq!(outcome.stage, Some(InterviewStage::FinalRound));
        assert_eq!(outcome.assign_stage, None);
        assert_eq!(outcome.notice, Some(Notice::TechPassed));
    }

    #[test]
    fn test_final_round_is_not_decided_by_the_gate() {
        let outcome = gate(
            &app(InterviewStage::FinalRound, ApplicationStatus::Applied),
            true,
            None,
        );
        assert!(outcome.is_noop());
        assert_eq!(outcome.notice, None);
    }

    #[test]
    fn test_terminal_applications_are_frozen() {
        for status in [ApplicationStatus::Accepted, ApplicationStatus::Rejected] {
            let approved = gate(&app(InterviewStage::HrRound, status), true, None);
            assert_eq!(approved, GateOutcome::default());
            let denied = gate(&app(InterviewStage::HrRound, status), false, None);
            assert_eq!(denied, GateOutcome::default());
        }
    }

    #[test]
    fn test_pending_stage_has_no_gate() {
        let outcome = gate(
            &app(InterviewStage::Pending, ApplicationStatus::Applied),
            true,
            None,
        );
        assert!(outcome.is_noop());
    }

    fn snapshot(
        has_pending_task: bool,
        latest_task: Option<(TaskStatus, i32)>,
        stage_task_exists: bool,
    ) -> RoutingSnapshot {
        RoutingSnapshot {
            has_pending_task,
            latest_task,
            stage_task_exists,
        }
    }

    #[test]
    fn test_route_assigns_hr_task_to_fresh_hr_application() {
        let step = route_step(
            &app(InterviewStage::HrRound, ApplicationStatus::Interviewing),
            &snapshot(false, None, false),
        );
        assert_eq!(step, RouteStep::AssignTask(TaskStage::Hr));
    }

    #[test]
    fn test_route_pending_task_takes_priority_over_everything() {
        // Even with a graded passing task on record, an open task wins.
        let step = route_step(
            &app(InterviewStage::HrRound, ApplicationStatus::Interviewing),
            &snapshot(true, Some((TaskStatus::Graded, 90)), true),
        );
        assert_eq!(step, RouteStep::Go(Destination::TaskForm));
    }

    #[test]
    fn test_route_submitted_task_waits_for_grading() {
        let step = route_step(
            &app(InterviewStage::HrRound, ApplicationStatus::Interviewing),
            &snapshot(false, Some((TaskStatus::Submitted, 0)), true),
        );
        assert_eq!(step, RouteStep::Go(Destination::TaskSubmitted));
    }

    #[test]
    fn test_route_passing_grade_advances_through_the_gate() {
        let application = app(InterviewStage::HrRound, ApplicationStatus::Interviewing);
        let step = route_step(&application, &snapshot(false, Some((TaskStatus::Graded, 80)), true));
        let RouteStep::Advance(outcome) = step else {
            panic!("expected an advance, got {step:?}");
        };
        assert_eq!(outcome.stage, Some(InterviewStage::TechRound));
        assert_eq!(outcome.assign_stage, Some(TaskStage::Tech));
    }

    #[test]
    fn test_route_failing_grade_waits() {
        let step = route_step(
            &app(InterviewStage::HrRound, ApplicationStatus::Interviewing),
            &snapshot(false, Some((TaskStatus::Graded, 40)), true),
        );
        assert_eq!(step, RouteStep::Go(Destination::TaskSubmitted));
    }

    #[test]
    fn test_route_final_round_opens_session_despite_passing_grade() {
        // The gate has nothing left to advance, so the passing graded task
        // falls through to the session step instead of looping.
        let step = route_step(
            &app(InterviewStage::FinalRound, ApplicationStatus::Interviewing),
            &snapshot(false, Some((TaskStatus::Graded, 95)), true),
        );
        assert_eq!(step, RouteStep::OpenSession);
    }

    #[test]
    fn test_route_decided_application_shows_result_view() {
        let step = route_step(
            &app(InterviewStage::TechRound, ApplicationStatus::Rejected),
            &snapshot(false, None, true),
        );
        assert_eq!(step, RouteStep::Go(Destination::InterviewRoom));
    }

    #[test]
    fn test_route_defaults_to_waiting() {
        let step = route_step(
            &app(InterviewStage::Pending, ApplicationStatus::Interviewing),
            &snapshot(false, None, false),
        );
        assert_eq!(step, RouteStep::Go(Destination::TaskSubmitted));
    }

    #[test]
    fn test_destination_serializes_snake_case() {
        let json = serde_json::to_string(&Destination::InterviewRoom).unwrap();
        assert_eq!(json, "\"interview_room\"");
    }
}
