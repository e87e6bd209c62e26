//! Runs a task graph in execution-plan order.
//!
//! For each planned task that is still `Pending`:
//!
//! 1. status → `InProgress`
//! 2. dispatch to the executor registered for its type (optionally under
//!    `workflow.task_timeout_secs`)
//! 3. status → `Completed` with a result, or `Failed` with an error
//! 4. append one execution-log entry
//!
//! A failing task never stops the run, and a failed dependency does not
//! block its dependents. After the plan is exhausted the answer is
//! synthesized from the completed tasks only.

use std::time::{Duration, Instant};

use agentic_rag_core::state::{apology, ExecutionLogEntry, WorkflowState};
use agentic_rag_core::task::{Task, TaskStatus};
use chrono::Utc;
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use crate::executor::ExecutorRegistry;
use crate::synthesis::AnswerSynthesizer;

pub struct Orchestrator {
    registry: ExecutorRegistry,
    synthesizer: AnswerSynthesizer,
}

impl Orchestrator {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self {
            registry,
            synthesizer: AnswerSynthesizer,
        }
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Execute every pending task of the plan, then synthesize the answer.
    pub async fn execute_plan(&self, state: &mut WorkflowState, ctx: &WorkflowContext) {
        tracing::info!(
            planned = state.execution_plan.len(),
            pending = state.pending_count(),
            iteration = state.iteration,
            "starting orchestration"
        );

        let plan = state.execution_plan.clone();
        for task_id in &plan {
            self.execute_task(state, ctx, task_id).await;
        }

        self.generate_final_answer(state, ctx).await;
        tracing::info!(
            completed = state.completed_tasks.len(),
            failed = state.failed_tasks.len(),
            "orchestration finished"
        );
    }

    async fn execute_task(&self, state: &mut WorkflowState, ctx: &WorkflowContext, task_id: &str) {
        let task = match state.task_mut(task_id) {
            Some(task) if task.status == TaskStatus::Pending => {
                if let Err(e) = task.start() {
                    tracing::warn!(task_id, error = %e, "cannot start task");
                    return;
                }
                task.clone()
            }
            Some(_) => return,
            None => {
                tracing::warn!(task_id, "task in execution plan not found");
                return;
            }
        };

        tracing::info!(task_id, task_type = %task.task_type(), description = %task.description, "executing task");
        let started = Instant::now();
        let outcome = self.run_task(&task, state, ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (success, result, error) = match outcome {
            Ok(value) => (true, Some(value), None),
            Err(e) => (false, None, Some(e.to_string())),
        };

        if let Some(t) = state.task_mut(task_id) {
            let transition = match (&result, &error) {
                (Some(value), _) => t.complete(value.clone()),
                (None, Some(message)) => t.fail(message.clone()),
                (None, None) => t.fail("task produced no result"),
            };
            if let Err(e) = transition {
                tracing::warn!(task_id, error = %e, "task state transition rejected");
            }
        }

        if success {
            tracing::info!(task_id, duration_ms, "task completed");
            state.completed_tasks.push(task_id.to_string());
        } else {
            tracing::warn!(task_id, error = error.as_deref().unwrap_or(""), "task failed");
            state.failed_tasks.push(task_id.to_string());
        }

        state.execution_log.push(ExecutionLogEntry {
            task_id: task_id.to_string(),
            task_type: task.task_type(),
            timestamp: Utc::now(),
            iteration: state.iteration,
            success,
            result,
            error,
            duration_ms,
        });
    }

    async fn run_task(
        &self,
        task: &Task,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<Value, WorkflowError> {
        let task_type = task.task_type();
        let executor = self
            .registry
            .get_executor(&task_type)
            .ok_or_else(|| WorkflowError::UnknownTaskType(task_type.to_string()))?;

        let execution = executor.execute(task, state, ctx);
        let result = match ctx.workflow.task_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), execution)
                .await
                .map_err(|_| WorkflowError::TaskTimeout {
                    task_id: task.id.clone(),
                    secs,
                })?,
            None => execution.await,
        };

        result.map_err(|e| WorkflowError::TaskExecution {
            task_id: task.id.clone(),
            message: format!("{:#}", e),
        })
    }

    /// Synthesize the answer from completed tasks and write it into `state`.
    pub async fn generate_final_answer(&self, state: &mut WorkflowState, ctx: &WorkflowContext) {
        match self.synthesizer.synthesize(state, ctx).await {
            Ok(answer) => {
                state.final_answer = answer.answer;
                state.confidence = answer.confidence;
                state.citations = answer.citations;
                state.sources_used = answer.sources_used;
                state.execution_summary = execution_summary(state);
            }
            Err(e) => {
                let err = WorkflowError::synthesis(&e);
                tracing::warn!(error = %err, "failed to generate final answer");
                state.set_failed_answer(
                    apology(&state.query),
                    "Failed to generate execution summary due to error",
                );
                state.record_error(err.to_string());
            }
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ExecutorRegistry::with_builtins())
    }
}

/// Short per-iteration summary of what ran.
pub fn execution_summary(state: &WorkflowState) -> String {
    let mut parts = vec![
        "Execution Summary:".to_string(),
        format!("- Total tasks planned: {}", state.tasks.len()),
        format!(
            "- Tasks completed successfully: {}",
            state.completed_tasks.len()
        ),
        format!("- Tasks failed: {}", state.failed_tasks.len()),
    ];

    if !state.completed_tasks.is_empty() {
        parts.push("- Completed tasks:".to_string());
        for id in &state.completed_tasks {
            if let Some(task) = state.task(id) {
                parts.push(format!("  * {}", task.description));
            }
        }
    }

    if !state.failed_tasks.is_empty() {
        parts.push("- Failed tasks:".to_string());
        for id in &state.failed_tasks {
            if let Some(task) = state.task(id) {
                parts.push(format!(
                    "  * {}: {}",
                    task.description,
                    task.error.as_deref().unwrap_or("Unknown error")
                ));
            }
        }
    }

    parts.join("\n")
}
