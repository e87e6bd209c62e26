//! Query → task graph.
//!
//! The planner asks the model for a JSON plan, turns each subtask into a
//! validated [`Task`], resolves the model's dependency references, and
//! orders the graph with [`execution_order`].
//!
//! Planning never fails: a model error, an unparsable reply, an empty
//! subtask list or an invalid subtask all produce the fallback plan, a
//! single priority-1 retrieval task over the raw query.

use std::collections::{BTreeSet, HashMap};

use agentic_rag_core::schedule::{execution_order, ExecutionOrder};
use agentic_rag_core::task::{
    short_id, RetrievalParams, Task, TaskParams, TaskStatus, TaskType, DEFAULT_PRIORITY,
    HIGHEST_PRIORITY, LOWEST_PRIORITY,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use crate::llm::{parse_json_reply, Prompt};

/// Output of [`Planner::create_plan`].
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub tasks: Vec<Task>,
    pub order: Vec<String>,
    /// Tasks appended by the cycle / missing-dependency fallback.
    pub unresolved: Vec<String>,
    pub reasoning: String,
    pub estimated_difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    /// Dependency references that were dropped while building the graph.
    pub warnings: Vec<String>,
    /// Set when the fallback plan replaced a failed planning attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Plan {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    estimated_difficulty: Option<String>,
    #[serde(default)]
    estimated_time: Option<String>,
    #[serde(default)]
    subtasks: Vec<RawSubtask>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    #[serde(default, alias = "task_id")]
    id: Option<Value>,
    #[serde(alias = "task_type")]
    r#type: String,
    description: String,
    #[serde(default)]
    priority: Option<Value>,
    #[serde(default)]
    dependencies: Vec<Value>,
    #[serde(default)]
    parameters: Value,
}

pub struct Planner;

impl Planner {
    /// Build a plan for `query`. Always returns at least one task.
    pub async fn create_plan(
        &self,
        ctx: &WorkflowContext,
        query: &str,
        user_context: Option<&str>,
        available_sources: &[String],
    ) -> Plan {
        tracing::info!(query, "creating execution plan");
        match self
            .try_create_plan(ctx, query, user_context, available_sources)
            .await
        {
            Ok(plan) => {
                tracing::info!(
                    tasks = plan.tasks.len(),
                    difficulty = %plan.estimated_difficulty,
                    "execution plan created"
                );
                plan
            }
            Err(e) => {
                let err = WorkflowError::planning(&e);
                tracing::warn!(error = %err, "planning failed, using fallback plan");
                fallback_plan(query, err.to_string())
            }
        }
    }

    async fn try_create_plan(
        &self,
        ctx: &WorkflowContext,
        query: &str,
        user_context: Option<&str>,
        available_sources: &[String],
    ) -> Result<Plan> {
        let prompt = planning_prompt(query, user_context, available_sources);
        let reply = ctx.model.complete(&prompt).await?;
        let value = parse_json_reply(&reply)?;
        let raw: RawPlan =
            serde_json::from_value(value).context("plan does not match the expected shape")?;
        build_plan(raw)
    }
}

fn build_plan(raw: RawPlan) -> Result<Plan> {
    if raw.subtasks.is_empty() {
        bail!("plan contains no subtasks");
    }
    let (tasks, warnings) = build_tasks(&raw.subtasks)?;
    for w in &warnings {
        tracing::warn!("{}", w);
    }
    let ExecutionOrder { order, unresolved } = execution_order(&tasks);
    Ok(Plan {
        tasks,
        order,
        unresolved,
        reasoning: raw.reasoning,
        estimated_difficulty: raw
            .estimated_difficulty
            .unwrap_or_else(|| "medium".to_string()),
        estimated_time: raw.estimated_time,
        warnings,
        error: None,
    })
}

/// Convert raw subtasks into tasks with resolved dependencies.
fn build_tasks(raw: &[RawSubtask]) -> Result<(Vec<Task>, Vec<String>)> {
    let ids: Vec<String> = (1..=raw.len())
        .map(|n| short_id(&format!("task_{}", n)))
        .collect();

    // Model-chosen ids, if any, map to the final ids.
    let mut named: HashMap<String, usize> = HashMap::new();
    for (i, sub) in raw.iter().enumerate() {
        if let Some(id) = sub.id.as_ref().and_then(value_as_key) {
            named.entry(id).or_insert(i);
        }
    }

    let mut tasks = Vec::with_capacity(raw.len());
    let mut warnings = Vec::new();

    for (i, sub) in raw.iter().enumerate() {
        let params = TaskParams::from_raw(&sub.r#type, sub.parameters.clone())
            .with_context(|| format!("subtask {} has invalid parameters", i + 1))?;
        let priority = parse_priority(sub.priority.as_ref());
        let mut task = Task::new(ids[i].clone(), sub.description.trim(), priority, params)
            .with_context(|| format!("subtask {} is invalid", i + 1))?;

        let mut deps = BTreeSet::new();
        for dep in &sub.dependencies {
            match resolve_dependency(dep, &named, raw.len()) {
                Some(j) if j == i => {
                    warnings.push(format!("dropped self-dependency of subtask {}", i + 1))
                }
                Some(j) => {
                    deps.insert(ids[j].clone());
                }
                None => warnings.push(format!(
                    "dropped unresolvable dependency {} of subtask {}",
                    dep,
                    i + 1
                )),
            }
        }
        task.dependencies = deps;
        if !task.task_type().is_known() {
            tracing::warn!(task_type = %task.task_type(), "plan names an unknown task type");
        }
        tasks.push(task);
    }

    Ok((tasks, warnings))
}

fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve a dependency reference to a 0-based subtask index.
///
/// Accepts a model-chosen id, `task_N` (1-based), or a bare position.
fn resolve_dependency(dep: &Value, named: &HashMap<String, usize>, len: usize) -> Option<usize> {
    let key = value_as_key(dep)?;
    if let Some(&i) = named.get(&key) {
        return Some(i);
    }
    let digits = key
        .strip_prefix("task_")
        .or_else(|| key.strip_prefix("task"))
        .unwrap_or(&key);
    let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
    let n: usize = digits.parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

fn parse_priority(value: Option<&Value>) -> u8 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(p) if p.is_finite() => {
            p.round()
                .clamp(HIGHEST_PRIORITY as f64, LOWEST_PRIORITY as f64) as u8
        }
        _ => DEFAULT_PRIORITY,
    }
}

/// The single-task plan used when planning fails.
pub fn fallback_plan(query: &str, error: String) -> Plan {
    let task = fallback_task(query);
    let id = task.id.clone();
    Plan {
        tasks: vec![task],
        order: vec![id],
        unresolved: Vec::new(),
        reasoning: "Fallback plan created due to planning failure".to_string(),
        estimated_difficulty: "medium".to_string(),
        estimated_time: None,
        warnings: Vec::new(),
        error: Some(error),
    }
}

fn fallback_task(query: &str) -> Task {
    Task {
        id: short_id("fallback_task"),
        description: format!("Retrieve and analyze documents to answer: {}", query),
        priority: HIGHEST_PRIORITY,
        dependencies: BTreeSet::new(),
        params: TaskParams::Retrieval(RetrievalParams {
            query: Some(query.to_string()).filter(|q| !q.trim().is_empty()),
            ..Default::default()
        }),
        status: TaskStatus::Pending,
        result: None,
        error: None,
    }
}

fn planning_prompt(query: &str, user_context: Option<&str>, sources: &[String]) -> Prompt {
    let task_types = TaskType::known()
        .iter()
        .map(|t| format!("- {}: {}", t, t.description()))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "You are an expert planning agent for a document-based question answering system.\n\
         Break the user's query into specific, actionable subtasks.\n\n\
         Available task types:\n{}\n\n\
         For each subtask decide what must be retrieved or analyzed, which earlier subtasks it \
         depends on, its priority (1=highest, 5=lowest) and any parameters.\n\
         Refer to dependencies as \"task_N\" where N is the 1-based position of the subtask.\n\
         A retrieval subtask may restrict itself to some of the available documents with a \
         \"sources\" parameter listing their titles.\n\n\
         Return a JSON object:\n\
         {{\"reasoning\": \"...\", \"estimated_difficulty\": \"easy|medium|hard\", \
         \"estimated_time\": \"...\", \"subtasks\": [{{\"type\": \"task_type\", \
         \"description\": \"...\", \"priority\": 1, \"dependencies\": [\"task_1\"], \
         \"parameters\": {{\"query\": \"...\"}}}}]}}",
        task_types
    );

    let mut context_parts = Vec::new();
    if let Some(c) = user_context {
        context_parts.push(format!("User Context: {}", c));
    }
    if !sources.is_empty() {
        context_parts.push(format!("Available Documents: {}", sources.join(", ")));
    }
    let context_info = if context_parts.is_empty() {
        "No additional context provided.".to_string()
    } else {
        context_parts.join("\n")
    };

    let user = format!(
        "Query: \"{}\"\n\nContext Information:\n{}\n\n\
         Please create a detailed execution plan for answering this query.",
        query, context_info
    );
    Prompt::new(system, user)
}
