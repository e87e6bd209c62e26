//! Per-run workflow state and the externally visible result.
//!
//! A [`WorkflowState`] is created once per run, threaded through the
//! planning, orchestration, reflection and finalize phases, and converted
//! into a [`WorkflowResult`] when the run ends. Tasks are only ever
//! appended, and the execution log is append-only.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::{Task, TaskStatus, TaskType};

/// Version tag carried by every [`WorkflowResult`].
pub const WORKFLOW_VERSION: &str = "2.0";

/// The answer returned when a run cannot produce one.
pub fn apology(query: &str) -> String {
    format!(
        "I apologize, but I encountered an error while processing your query: '{}'. Please try again.",
        query
    )
}

// ═══════════════════════════════════════════════════════════════════════
// Execution log and citations
// ═══════════════════════════════════════════════════════════════════════

/// One attempt to execute a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub task_id: String,
    pub task_type: TaskType,
    pub timestamp: DateTime<Utc>,
    pub iteration: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A cited passage backing part of the final answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// Task id or passage id the citation came from.
    pub id: String,
    pub source: String,
    pub snippet: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Reflection
// ═══════════════════════════════════════════════════════════════════════

/// Overall answer quality as judged by reflection, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Excellent,
    Good,
    Adequate,
    Poor,
    Inadequate,
}

impl Quality {
    /// Parse a model-provided label, ignoring case and surrounding noise
    /// such as `"Good."` or `"quality: poor"`.
    pub fn parse_lenient(label: &str) -> Option<Self> {
        let lower = label.to_ascii_lowercase();
        // "inadequate" contains "adequate", so it must be checked first.
        [
            ("excellent", Quality::Excellent),
            ("inadequate", Quality::Inadequate),
            ("adequate", Quality::Adequate),
            ("good", Quality::Good),
            ("poor", Quality::Poor),
        ]
        .into_iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, q)| q)
    }

    pub fn is_below_adequate(self) -> bool {
        self > Quality::Adequate
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quality::Excellent => "excellent",
            Quality::Good => "good",
            Quality::Adequate => "adequate",
            Quality::Poor => "poor",
            Quality::Inadequate => "inadequate",
        };
        f.write_str(s)
    }
}

/// Outcome of one reflection round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionVerdict {
    /// Iteration the verdict was produced in (1-based).
    pub iteration: u32,
    /// `None` when reflection itself failed.
    pub quality: Option<Quality>,
    pub completeness_score: f64,
    pub accuracy_score: f64,
    pub relevance_score: f64,
    pub needs_more_research: bool,
    pub missing_aspects: Vec<String>,
    pub recommendations: Vec<String>,
    /// Ids of the tasks this round appended to the graph.
    pub additional_tasks: Vec<String>,
    pub reasoning: String,
    /// True when the verdict came from the confidence heuristic rather
    /// than a parsed model reply.
    #[serde(default)]
    pub heuristic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReflectionVerdict {
    /// Verdict recorded when the reflection step fails outright.
    pub fn failed(iteration: u32, error: impl Into<String>) -> Self {
        Self {
            iteration,
            quality: None,
            completeness_score: 0.0,
            accuracy_score: 0.0,
            relevance_score: 0.0,
            needs_more_research: false,
            missing_aspects: Vec::new(),
            recommendations: vec!["Reflection failed due to error".to_string()],
            additional_tasks: Vec::new(),
            reasoning: String::new(),
            heuristic: false,
            error: Some(error.into()),
        }
    }

    pub fn quality_label(&self) -> String {
        match self.quality {
            Some(q) => q.to_string(),
            None => "error".to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// WorkflowState
// ═══════════════════════════════════════════════════════════════════════

/// A dependency dropped while appending tasks because it named no task in
/// the graph (or the task itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedDependency {
    pub task_id: String,
    pub dependency: String,
}

/// Mutable state of a single workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub query: String,
    pub user_context: Option<String>,
    pub planning_reasoning: String,
    pub estimated_difficulty: Option<String>,
    pub tasks: Vec<Task>,
    pub execution_plan: Vec<String>,
    pub completed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    pub execution_log: Vec<ExecutionLogEntry>,
    pub final_answer: String,
    pub confidence: f64,
    pub citations: Vec<Citation>,
    pub sources_used: Vec<String>,
    pub execution_summary: String,
    /// Starts at 1 and never exceeds `max_iterations`.
    pub iteration: u32,
    pub max_iterations: u32,
    pub reflection_enabled: bool,
    pub reflections: Vec<ReflectionVerdict>,
    pub needs_more_research: bool,
    pub reflection_task_ids: Vec<String>,
    pub error_messages: Vec<String>,
    pub processing_timestamp: Option<DateTime<Utc>>,
}

impl WorkflowState {
    /// Create the state for a new run. `max_iterations` is raised to 1 if 0.
    pub fn new(
        query: impl Into<String>,
        user_context: Option<String>,
        max_iterations: u32,
        reflection_enabled: bool,
    ) -> Self {
        Self {
            query: query.into(),
            user_context: user_context.filter(|c| !c.trim().is_empty()),
            planning_reasoning: String::new(),
            estimated_difficulty: None,
            tasks: Vec::new(),
            execution_plan: Vec::new(),
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            execution_log: Vec::new(),
            final_answer: String::new(),
            confidence: 0.0,
            citations: Vec::new(),
            sources_used: Vec::new(),
            execution_summary: String::new(),
            iteration: 1,
            max_iterations: max_iterations.max(1),
            reflection_enabled,
            reflections: Vec::new(),
            needs_more_research: false,
            reflection_task_ids: Vec::new(),
            error_messages: Vec::new(),
            processing_timestamp: None,
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Completed tasks in graph order.
    pub fn completed(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
    }

    /// Completed tasks of one type, in graph order.
    pub fn completed_of_type(&self, task_type: TaskType) -> impl Iterator<Item = &Task> {
        self.completed().filter(move |t| t.task_type() == task_type)
    }

    pub fn pending_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    /// Whether another orchestration round is still allowed.
    pub fn can_iterate(&self) -> bool {
        self.iteration < self.max_iterations
    }

    /// Advance the iteration counter if below the maximum.
    pub fn advance_iteration(&mut self) -> bool {
        if self.can_iterate() {
            self.iteration += 1;
            true
        } else {
            false
        }
    }

    /// Append tasks to the graph.
    ///
    /// Tasks whose id already exists are skipped. Dependencies that name no
    /// task (after the append) or the task itself are removed and returned
    /// so the caller can log them.
    pub fn append_tasks(&mut self, tasks: Vec<Task>) -> Vec<DroppedDependency> {
        let mut known: BTreeSet<String> = self.tasks.iter().map(|t| t.id.clone()).collect();
        let fresh: Vec<Task> = tasks
            .into_iter()
            .filter(|t| known.insert(t.id.clone()))
            .collect();

        let mut dropped = Vec::new();
        for mut task in fresh {
            let invalid: Vec<String> = task
                .dependencies
                .iter()
                .filter(|d| **d == task.id || !known.contains(*d))
                .cloned()
                .collect();
            for dep in invalid {
                task.dependencies.remove(&dep);
                dropped.push(DroppedDependency {
                    task_id: task.id.clone(),
                    dependency: dep,
                });
            }
            self.tasks.push(task);
        }
        dropped
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    /// Set the fields describing a failed answer.
    pub fn set_failed_answer(&mut self, answer: impl Into<String>, summary: impl Into<String>) {
        self.final_answer = answer.into();
        self.confidence = 0.0;
        self.citations.clear();
        self.sources_used.clear();
        self.execution_summary = summary.into();
    }
}

// ═══════════════════════════════════════════════════════════════════════
// WorkflowResult
// ═══════════════════════════════════════════════════════════════════════

/// Processing details attached to a [`WorkflowResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub subtasks_planned: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub iterations: u32,
    pub planning_reasoning: String,
    pub execution_log: Vec<ExecutionLogEntry>,
    pub reflections: Vec<ReflectionVerdict>,
}

/// The externally visible outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub query: String,
    pub answer: String,
    pub confidence: f64,
    pub citations: Vec<Citation>,
    pub sources_used: Vec<String>,
    pub execution_summary: String,
    pub processing_info: ProcessingInfo,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub workflow_version: String,
}

impl WorkflowResult {
    pub fn from_state(state: WorkflowState) -> Self {
        let processing_info = ProcessingInfo {
            subtasks_planned: state.tasks.len(),
            tasks_completed: state.completed_tasks.len(),
            tasks_failed: state.failed_tasks.len(),
            iterations: state.iteration,
            planning_reasoning: state.planning_reasoning,
            execution_log: state.execution_log,
            reflections: state.reflections,
        };
        Self {
            query: state.query,
            answer: state.final_answer,
            confidence: state.confidence.clamp(0.0, 1.0),
            citations: state.citations,
            sources_used: state.sources_used,
            execution_summary: state.execution_summary,
            processing_info,
            errors: state.error_messages,
            timestamp: state.processing_timestamp.unwrap_or_else(Utc::now),
            workflow_version: WORKFLOW_VERSION.to_string(),
        }
    }

    /// Result returned when the run fails before producing any state.
    pub fn failure(query: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            query: query.to_string(),
            answer: apology(query),
            confidence: 0.0,
            citations: Vec::new(),
            sources_used: Vec::new(),
            execution_summary: format!("Workflow failed: {}", error),
            processing_info: ProcessingInfo::default(),
            errors: vec![error],
            timestamp: Utc::now(),
            workflow_version: WORKFLOW_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{AnalysisParams, TaskParams};

    fn analysis(id: &str, deps: &[&str]) -> Task {
        Task::new(
            id,
            "analyze",
            2,
            TaskParams::Analysis(AnalysisParams::default()),
        )
        .unwrap()
        .with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_quality_parse_lenient() {
        assert_eq!(Quality::parse_lenient("Good."), Some(Quality::Good));
        assert_eq!(Quality::parse_lenient("INADEQUATE"), Some(Quality::Inadequate));
        assert_eq!(Quality::parse_lenient("adequate"), Some(Quality::Adequate));
        assert_eq!(Quality::parse_lenient("meh"), None);
    }

    #[test]
    fn test_quality_below_adequate() {
        assert!(!Quality::Excellent.is_below_adequate());
        assert!(!Quality::Adequate.is_below_adequate());
        assert!(Quality::Poor.is_below_adequate());
        assert!(Quality::Inadequate.is_below_adequate());
    }

    #[test]
    fn test_new_state_starts_at_iteration_one() {
        let state = WorkflowState::new("q", Some("  ".into()), 0, true);
        assert_eq!(state.iteration, 1);
        assert_eq!(state.max_iterations, 1);
        assert!(state.user_context.is_none());
        assert!(!state.can_iterate());
    }

    #[test]
    fn test_advance_iteration_caps_at_max() {
        let mut state = WorkflowState::new("q", None, 3, true);
        assert!(state.advance_iteration());
        assert!(state.advance_iteration());
        assert!(!state.advance_iteration());
        assert_eq!(state.iteration, 3);
    }

    #[test]
    fn test_append_tasks_drops_unknown_and_self_dependencies() {
        let mut state = WorkflowState::new("q", None, 3, false);
        state.append_tasks(vec![analysis("a", &[])]);
        let dropped = state.append_tasks(vec![
            analysis("b", &["a", "ghost"]),
            analysis("c", &["c", "b"]),
        ]);
        assert_eq!(dropped.len(), 2);
        assert_eq!(state.task("b").unwrap().dependencies.len(), 1);
        assert!(state.task("c").unwrap().dependencies.contains("b"));
        assert!(!state.task("c").unwrap().dependencies.contains("c"));
    }

    #[test]
    fn test_append_tasks_skips_duplicate_ids() {
        let mut state = WorkflowState::new("q", None, 3, false);
        state.append_tasks(vec![analysis("a", &[]), analysis("a", &[])]);
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn test_failure_result_shape() {
        let result = WorkflowResult::failure("rates?", "boom");
        assert_eq!(result.confidence, 0.0);
        assert!(result.answer.contains("rates?"));
        assert_eq!(result.errors, vec!["boom"]);
        assert_eq!(result.workflow_version, WORKFLOW_VERSION);
    }

    #[test]
    fn test_from_state_counts() {
        let mut state = WorkflowState::new("q", None, 2, false);
        state.append_tasks(vec![analysis("a", &[]), analysis("b", &[])]);
        state.completed_tasks.push("a".into());
        state.failed_tasks.push("b".into());
        state.confidence = 1.4;
        let result = WorkflowResult::from_state(state);
        assert_eq!(result.processing_info.subtasks_planned, 2);
        assert_eq!(result.processing_info.tasks_completed, 1);
        assert_eq!(result.processing_info.tasks_failed, 1);
        assert_eq!(result.confidence, 1.0);
    }
}
