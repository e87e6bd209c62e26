//! Pluggable task executors.
//!
//! Each [`TaskType`] is handled by one [`TaskExecutor`]. The orchestrator
//! looks executors up in an [`ExecutorRegistry`]; a task whose type has no
//! registered executor fails with "no executor found for task type: X".
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ExecutorRegistry               │
//! │  retrieval  analysis  synthesis  ...  custom │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!        Orchestrator::execute_plan() → task results
//! ```
//!
//! # Usage
//!
//! ```rust
//! use agentic_rag::executor::ExecutorRegistry;
//! use agentic_rag_core::task::TaskType;
//!
//! let registry = ExecutorRegistry::with_builtins();
//! assert!(registry.get_executor(&TaskType::Retrieval).is_some());
//! assert!(registry.get_executor(&TaskType::from("web_search")).is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use agentic_rag_core::state::WorkflowState;
use agentic_rag_core::task::{Task, TaskType};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::executors::{
    AnalysisExecutor, CalculationExecutor, FormattingExecutor, RetrievalExecutor,
    SynthesisExecutor, VerificationExecutor,
};

// ═══════════════════════════════════════════════════════════════════════
// TaskExecutor Trait
// ═══════════════════════════════════════════════════════════════════════

/// Performs the work of one task type.
///
/// Executors hold no per-run state. They read the run through a shared
/// `&WorkflowState` and return the task's result; the orchestrator owns
/// every status transition.
///
/// # Example
///
/// ```rust
/// use agentic_rag::context::WorkflowContext;
/// use agentic_rag::executor::TaskExecutor;
/// use agentic_rag_core::state::WorkflowState;
/// use agentic_rag_core::task::{Task, TaskType};
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// pub struct CountExecutor;
///
/// #[async_trait]
/// impl TaskExecutor for CountExecutor {
///     fn task_type(&self) -> TaskType { TaskType::Calculation }
///
///     async fn execute(&self, _task: &Task, state: &WorkflowState, _ctx: &WorkflowContext) -> Result<Value> {
///         Ok(json!({ "completed_so_far": state.completed_tasks.len() }))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// The task type this executor handles.
    fn task_type(&self) -> TaskType;

    /// Run `task` and return its result object.
    ///
    /// An `Err` marks the task failed; the run continues.
    async fn execute(
        &self,
        task: &Task,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ExecutorRegistry
// ═══════════════════════════════════════════════════════════════════════

/// Executors keyed by task type.
pub struct ExecutorRegistry {
    executors: HashMap<TaskType, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Create a registry with the six built-in executors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RetrievalExecutor));
        registry.register(Arc::new(AnalysisExecutor));
        registry.register(Arc::new(SynthesisExecutor));
        registry.register(Arc::new(VerificationExecutor));
        registry.register(Arc::new(CalculationExecutor));
        registry.register(Arc::new(FormattingExecutor));
        registry
    }

    /// Register an executor, replacing any existing one for its type.
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(executor.task_type(), executor);
    }

    pub fn get_executor(&self, task_type: &TaskType) -> Option<&dyn TaskExecutor> {
        self.executors.get(task_type).map(|e| e.as_ref())
    }

    /// Registered task types, sorted by name.
    pub fn task_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.executors.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_cover_known_types() {
        let registry = ExecutorRegistry::with_builtins();
        assert_eq!(registry.len(), 6);
        for t in TaskType::known() {
            assert!(registry.get_executor(&t).is_some(), "missing {}", t);
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = ExecutorRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.get_executor(&TaskType::Analysis).is_none());
    }

    #[test]
    fn test_register_replaces_same_type() {
        let mut registry = ExecutorRegistry::with_builtins();
        registry.register(Arc::new(RetrievalExecutor));
        assert_eq!(registry.len(), 6);
    }
}
