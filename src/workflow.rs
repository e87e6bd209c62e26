//! The planning / orchestration / reflection loop.
//!
//! ```text
//! Planning ──▶ Orchestration ──▶ Reflection ──▶ Orchestration ...
//!                    │                │
//!                    └────────────────┴──▶ Finalize
//! ```
//!
//! Reflection runs only when enabled and iterations remain. The iteration
//! counter starts at 1, increments once per extra orchestration round, and
//! never exceeds `max_iterations`. A run always yields a [`WorkflowResult`].

use agentic_rag_core::schedule::execution_order;
use agentic_rag_core::state::{ReflectionVerdict, WorkflowResult, WorkflowState};
use agentic_rag_core::task::TaskStatus;
use chrono::Utc;

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use crate::executor::ExecutorRegistry;
use crate::llm::truncate_chars;
use crate::orchestrator::Orchestrator;
use crate::planner::{Plan, Planner};
use crate::reflector::{follow_up_tasks, Reflector};

const ANSWER_PREVIEW_CHARS: usize = 200;

/// Current step of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Orchestration,
    Reflection,
    Finalize,
}

/// Per-run overrides of the `[workflow]` config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub enable_reflection: Option<bool>,
    pub max_iterations: Option<u32>,
}

pub struct WorkflowEngine {
    planner: Planner,
    orchestrator: Orchestrator,
}

impl WorkflowEngine {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self {
            planner: Planner,
            orchestrator: Orchestrator::new(registry),
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        self.orchestrator.registry()
    }

    /// Plan `query` without executing anything.
    pub async fn plan(
        &self,
        ctx: &WorkflowContext,
        query: &str,
        user_context: Option<&str>,
    ) -> Plan {
        self.planner
            .create_plan(ctx, query, user_context, &ctx.available_sources())
            .await
    }

    /// Answer `query`. Never fails; errors end up in `WorkflowResult::errors`.
    pub async fn run(
        &self,
        ctx: &WorkflowContext,
        query: &str,
        user_context: Option<String>,
        options: RunOptions,
    ) -> WorkflowResult {
        let query = query.trim();
        if query.is_empty() {
            let err = WorkflowError::Workflow("query must not be empty".to_string());
            tracing::warn!(error = %err, "rejecting workflow run");
            return WorkflowResult::failure(query, err.to_string());
        }

        let mut state = WorkflowState::new(
            query,
            user_context,
            options
                .max_iterations
                .unwrap_or(ctx.workflow.max_iterations),
            options
                .enable_reflection
                .unwrap_or(ctx.workflow.enable_reflection),
        );
        let reflector = Reflector::new(ctx.workflow.reflection_threshold);

        tracing::info!(
            query,
            reflection = state.reflection_enabled,
            max_iterations = state.max_iterations,
            "starting workflow"
        );

        let mut phase = Phase::Planning;
        loop {
            tracing::debug!(?phase, iteration = state.iteration, "entering phase");
            phase = match phase {
                Phase::Planning => {
                    self.planning(&mut state, ctx).await;
                    Phase::Orchestration
                }
                Phase::Orchestration => {
                    self.orchestrator.execute_plan(&mut state, ctx).await;
                    if state.reflection_enabled && state.can_iterate() {
                        Phase::Reflection
                    } else {
                        Phase::Finalize
                    }
                }
                Phase::Reflection => {
                    reflection(&reflector, &mut state, ctx).await;
                    if state.needs_more_research && state.advance_iteration() {
                        tracing::info!(iteration = state.iteration, "starting iteration");
                        Phase::Orchestration
                    } else {
                        Phase::Finalize
                    }
                }
                Phase::Finalize => {
                    finalize(&mut state);
                    break;
                }
            };
        }

        tracing::info!(
            confidence = state.confidence,
            completed = state.completed_tasks.len(),
            failed = state.failed_tasks.len(),
            iterations = state.iteration,
            "workflow finished"
        );
        WorkflowResult::from_state(state)
    }

    async fn planning(&self, state: &mut WorkflowState, ctx: &WorkflowContext) {
        let plan = self
            .plan(ctx, &state.query, state.user_context.as_deref())
            .await;

        if let Some(err) = &plan.error {
            state.record_error(err.clone());
        }
        for warning in &plan.warnings {
            tracing::warn!(warning = %warning, "plan adjusted");
        }
        if !plan.unresolved.is_empty() {
            record_unresolved(state, &plan.unresolved);
        }

        state.planning_reasoning = plan.reasoning;
        state.estimated_difficulty = Some(plan.estimated_difficulty);
        state.tasks = plan.tasks;
        state.execution_plan = plan.order;
        tracing::info!(tasks = state.tasks.len(), "planning phase complete");
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(ExecutorRegistry::with_builtins())
    }
}

/// Run one query with the built-in executors and the config's defaults.
pub async fn run_workflow(
    ctx: &WorkflowContext,
    query: &str,
    user_context: Option<String>,
) -> WorkflowResult {
    WorkflowEngine::default()
        .run(ctx, query, user_context, RunOptions::default())
        .await
}

async fn reflection(reflector: &Reflector, state: &mut WorkflowState, ctx: &WorkflowContext) {
    let mut verdict = match reflector.reflect(state, ctx).await {
        Ok(verdict) => verdict,
        Err(e) => {
            let err = WorkflowError::reflection(&e);
            tracing::warn!(error = %err, "reflection failed");
            state.record_error(err.to_string());
            state.needs_more_research = false;
            state
                .reflections
                .push(ReflectionVerdict::failed(state.iteration, err.to_string()));
            return;
        }
    };

    let mut needs_more_research = verdict.needs_more_research;
    if needs_more_research && state.can_iterate() {
        let tasks = follow_up_tasks(state, &verdict);
        if tasks.is_empty() {
            tracing::info!("reflection asked for research but named no gaps");
            needs_more_research = false;
        } else {
            let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
            for dropped in state.append_tasks(tasks) {
                tracing::warn!(
                    task_id = %dropped.task_id,
                    dependency = %dropped.dependency,
                    "dropped unknown dependency"
                );
            }
            tracing::info!(added = ids.len(), "reflection added tasks");
            state.reflection_task_ids.extend(ids.iter().cloned());
            verdict.additional_tasks = ids;
            reorder(state);
        }
    }

    state.needs_more_research = needs_more_research;
    state.reflections.push(verdict);
}

/// Recompute the execution plan over the whole task set.
fn reorder(state: &mut WorkflowState) {
    let order = execution_order(&state.tasks);
    if !order.is_fully_resolved() {
        record_unresolved(state, &order.unresolved);
    }
    state.execution_plan = order.order;
}

/// Tasks caught in a dependency cycle (or waiting on an unknown id) still
/// run, after the ordered ones, in plan order.
fn record_unresolved(state: &mut WorkflowState, unresolved: &[String]) {
    let message = unresolved_message(unresolved);
    tracing::warn!(tasks = unresolved.len(), "{}", message);
    state.record_error(message);
}

fn unresolved_message(unresolved: &[String]) -> String {
    format!(
        "could not fully order tasks (dependency cycle or unknown dependency), \
         appended in plan order: {}",
        unresolved.join(", ")
    )
}

fn finalize(state: &mut WorkflowState) {
    state.execution_summary = execution_report(state);
    state.processing_timestamp = Some(Utc::now());
}

/// Human-readable report of the whole run.
pub fn execution_report(state: &WorkflowState) -> String {
    let mut parts = vec![
        "=== EXECUTION REPORT ===".to_string(),
        format!("Query: {}", state.query),
        format!("Timestamp: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        String::new(),
        "PLANNING PHASE:".to_string(),
        format!("- Total subtasks planned: {}", state.tasks.len()),
        format!(
            "- Planning reasoning: {}",
            if state.planning_reasoning.is_empty() {
                "N/A"
            } else {
                state.planning_reasoning.as_str()
            }
        ),
        String::new(),
    ];

    let total = state.tasks.len();
    let completed = state.completed_tasks.len();
    parts.push("TASK EXECUTION:".to_string());
    parts.push(format!("- Total tasks: {}", total));
    parts.push(format!("- Completed successfully: {}", completed));
    parts.push(format!("- Failed: {}", state.failed_tasks.len()));
    if total > 0 {
        parts.push(format!(
            "- Success rate: {:.1}%",
            completed as f64 / total as f64 * 100.0
        ));
    } else {
        parts.push("- Success rate: 0%".to_string());
    }
    parts.push(format!("- Iterations performed: {}", state.iteration));
    parts.push(String::new());

    if state.reflection_enabled {
        parts.push("REFLECTION PHASE:".to_string());
        parts.push(format!("- Reflection iterations: {}", state.reflections.len()));
        parts.push(format!(
            "- Needs more research: {}",
            state.needs_more_research
        ));
        parts.push(format!(
            "- Additional tasks generated: {}",
            state.reflection_task_ids.len()
        ));
        for (i, verdict) in state.reflections.iter().enumerate() {
            parts.push(format!(
                "- Iteration {} quality: {}",
                i + 1,
                verdict.quality_label()
            ));
            if !verdict.recommendations.is_empty() {
                let shown: Vec<&str> = verdict
                    .recommendations
                    .iter()
                    .take(2)
                    .map(String::as_str)
                    .collect();
                parts.push(format!("  Recommendations: {}", shown.join(", ")));
            }
        }
        parts.push(String::new());
    }

    parts.push("DETAILED TASK RESULTS:".to_string());
    for task in &state.tasks {
        let mark = match task.status {
            TaskStatus::Completed => "[ok]",
            TaskStatus::Failed => "[failed]",
            _ => "[skipped]",
        };
        parts.push(format!(
            "{} {} ({}): {}",
            mark,
            task.id,
            task.task_type(),
            task.description
        ));
        if let (TaskStatus::Failed, Some(e)) = (task.status, &task.error) {
            parts.push(format!("   Error: {}", e));
        }
    }
    parts.push(String::new());

    parts.push("FINAL ANSWER:".to_string());
    parts.push(format!("- Confidence Score: {:.2}", state.confidence));
    parts.push(format!("- Sources Used: {}", state.sources_used.len()));
    parts.push(format!("- Citations: {}", state.citations.len()));
    parts.push(String::new());

    let preview = if state.final_answer.is_empty() {
        "No answer generated".to_string()
    } else {
        truncate_chars(&state.final_answer, ANSWER_PREVIEW_CHARS)
    };
    parts.push(format!("Answer Preview: {}", preview));
    parts.push(String::new());

    if !state.error_messages.is_empty() {
        parts.push("ERRORS ENCOUNTERED:".to_string());
        for e in &state.error_messages {
            parts.push(format!("- {}", e));
        }
        parts.push(String::new());
    }

    parts.push("=== END OF REPORT ===".to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentic_rag_core::task::Task;

    #[test]
    fn test_report_sections() {
        let mut state = WorkflowState::new("q", None, 3, true);
        let mut done = Task::retrieval("task_1", "find things", 1, "q").unwrap();
        done.start().unwrap();
        done.complete(serde_json::json!({})).unwrap();
        let mut broken = Task::retrieval("task_2", "find more", 2, "q").unwrap();
        broken.start().unwrap();
        broken.fail("index offline").unwrap();
        state.tasks = vec![done, broken];
        state.completed_tasks = vec!["task_1".into()];
        state.failed_tasks = vec!["task_2".into()];
        state.final_answer = "x".repeat(300);
        state.record_error("planning failed: boom");

        let report = execution_report(&state);
        assert!(report.starts_with("=== EXECUTION REPORT ==="));
        assert!(report.contains("- Success rate: 50.0%"));
        assert!(report.contains("REFLECTION PHASE:"));
        assert!(report.contains("[ok] task_1 (retrieval): find things"));
        assert!(report.contains("   Error: index offline"));
        assert!(report.contains(&format!("Answer Preview: {}...", "x".repeat(200))));
        assert!(report.contains("- planning failed: boom"));
        assert!(report.ends_with("=== END OF REPORT ==="));
    }

    #[test]
    fn test_unresolved_message_names_plan_order() {
        let message = unresolved_message(&["task_2".to_string(), "task_1".to_string()]);
        assert!(message.ends_with("appended in plan order: task_2, task_1"));
        assert!(!message.contains("priority"));
    }

    #[test]
    fn test_reorder_records_cycle() {
        let mut state = WorkflowState::new("q", None, 3, true);
        let a = Task::retrieval("task_1", "first", 1, "q")
            .unwrap()
            .with_dependencies(["task_2"]);
        let b = Task::retrieval("task_2", "second", 1, "q")
            .unwrap()
            .with_dependencies(["task_1"]);
        state.tasks = vec![a, b];

        reorder(&mut state);

        assert_eq!(state.execution_plan, vec!["task_1", "task_2"]);
        assert_eq!(state.error_messages.len(), 1);
        assert!(state.error_messages[0].contains("dependency cycle"));
    }

    #[test]
    fn test_report_without_tasks() {
        let state = WorkflowState::new("q", None, 1, false);
        let report = execution_report(&state);
        assert!(report.contains("- Success rate: 0%"));
        assert!(report.contains("Planning reasoning: N/A"));
        assert!(!report.contains("REFLECTION PHASE:"));
        assert!(report.contains("Answer Preview: No answer generated"));
    }
}
