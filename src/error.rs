//! Error taxonomy of a workflow run.
//!
//! Every variant is recoverable: the workflow records the message and takes
//! the matching fallback instead of aborting.
//!
//! | Variant | Recovery |
//! |---------|----------|
//! | `Planning` | single fallback retrieval task |
//! | `TaskExecution`, `UnknownTaskType`, `TaskTimeout` | task marked failed, run continues |
//! | `Reflection` | no further research |
//! | `Synthesis` | apology answer, confidence 0.0 |
//! | `Workflow` | apology [`WorkflowResult`](agentic_rag_core::state::WorkflowResult) |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("planning failed: {0}")]
    Planning(String),

    #[error("task {task_id} failed: {message}")]
    TaskExecution { task_id: String, message: String },

    #[error("no executor found for task type: {0}")]
    UnknownTaskType(String),

    #[error("task {task_id} timed out after {secs}s")]
    TaskTimeout { task_id: String, secs: u64 },

    #[error("reflection failed: {0}")]
    Reflection(String),

    #[error("answer synthesis failed: {0}")]
    Synthesis(String),

    #[error("workflow failed: {0}")]
    Workflow(String),
}

impl WorkflowError {
    /// Wrap an `anyhow` error, keeping its full context chain in the message.
    pub fn planning(err: &anyhow::Error) -> Self {
        WorkflowError::Planning(format!("{:#}", err))
    }

    pub fn reflection(err: &anyhow::Error) -> Self {
        WorkflowError::Reflection(format!("{:#}", err))
    }

    pub fn synthesis(err: &anyhow::Error) -> Self {
        WorkflowError::Synthesis(format!("{:#}", err))
    }
}
