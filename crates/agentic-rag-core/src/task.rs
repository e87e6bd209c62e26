//! Task model for the planner/orchestrator workflow.
//!
//! A [`Task`] is one unit of planned work. Its type is not stored separately:
//! it is derived from the [`TaskParams`] tagged union, so a task can never
//! carry parameters that belong to a different task type.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──start()──▶ InProgress ──complete()──▶ Completed
//!                                 └──fail()─────▶ Failed
//! ```
//!
//! `Completed` and `Failed` are terminal: every transition method refuses to
//! touch a terminal task.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{bail, Context, Result};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Highest scheduling priority.
pub const HIGHEST_PRIORITY: u8 = 1;
/// Lowest scheduling priority.
pub const LOWEST_PRIORITY: u8 = 5;
/// Priority used when a planner does not specify one.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Generate a task id of the form `{prefix}_{8 hex chars}`.
pub fn short_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &uuid[..8])
}

// ═══════════════════════════════════════════════════════════════════════
// TaskType
// ═══════════════════════════════════════════════════════════════════════

/// The kind of work a task performs.
///
/// `Unknown` keeps whatever name a planner produced so that the failure can
/// be reported against it ("no executor found for task type: X").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    Retrieval,
    Analysis,
    Synthesis,
    Verification,
    Calculation,
    Formatting,
    Unknown(String),
}

impl TaskType {
    /// All task types with a built-in executor, in planning-prompt order.
    pub fn known() -> [TaskType; 6] {
        [
            TaskType::Retrieval,
            TaskType::Analysis,
            TaskType::Synthesis,
            TaskType::Verification,
            TaskType::Calculation,
            TaskType::Formatting,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Retrieval => "retrieval",
            TaskType::Analysis => "analysis",
            TaskType::Synthesis => "synthesis",
            TaskType::Verification => "verification",
            TaskType::Calculation => "calculation",
            TaskType::Formatting => "formatting",
            TaskType::Unknown(name) => name,
        }
    }

    /// One-line description used in planning prompts.
    pub fn description(&self) -> &'static str {
        match self {
            TaskType::Retrieval => "Search and retrieve relevant documents",
            TaskType::Analysis => "Analyze retrieved content for specific information",
            TaskType::Synthesis => "Combine information from multiple sources",
            TaskType::Verification => "Verify facts and cross-check information",
            TaskType::Calculation => "Perform numerical calculations or comparisons",
            TaskType::Formatting => "Format and structure the final response",
            TaskType::Unknown(_) => "Unknown task type",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TaskType::Unknown(_))
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "retrieval" => TaskType::Retrieval,
            "analysis" => TaskType::Analysis,
            "synthesis" => TaskType::Synthesis,
            "verification" => TaskType::Verification,
            "calculation" => TaskType::Calculation,
            "formatting" => TaskType::Formatting,
            _ => TaskType::Unknown(value.trim().to_string()),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(TaskType::from(s.as_str()))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Typed parameters
// ═══════════════════════════════════════════════════════════════════════

/// Parameters for a retrieval task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalParams {
    /// Search query; the original user query is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Gap the query is meant to fill (set by reflection).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    /// Override for the number of fused results to keep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Only search passages whose title or source contains one of these
    /// names. Empty means the whole corpus.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// Parameters for an analysis task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    /// Reflection recommendation this analysis follows up on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Parameters for a synthesis task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

/// Parameters for a verification task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationParams {
    /// Specific claims to check; everything completed so far when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<String>,
}

/// Parameters for a calculation task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationParams {
    /// Arithmetic expression evaluated deterministically when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Free-form calculation kind (e.g. `"comparison"`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Parameters for a formatting task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FormattingParams {
    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or("standard")
    }
}

/// Per-type task parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskParams {
    Retrieval(RetrievalParams),
    Analysis(AnalysisParams),
    Synthesis(SynthesisParams),
    Verification(VerificationParams),
    Calculation(CalculationParams),
    Formatting(FormattingParams),
    /// Parameters of a task type no executor knows about, kept verbatim.
    Unknown {
        #[serde(skip)]
        task_type: String,
        #[serde(flatten)]
        raw: Map<String, Value>,
    },
}

impl TaskParams {
    /// Build typed parameters from a type name and a loosely-typed JSON value.
    ///
    /// `null` is accepted as "no parameters". Blank strings are normalized to
    /// `None` so executors never see an empty query or expression.
    pub fn from_raw(task_type: &str, raw: Value) -> Result<Self> {
        let raw = match raw {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => raw,
            other => bail!(
                "parameters for '{}' task must be an object, got {}",
                task_type,
                other
            ),
        };

        let params = match TaskType::from(task_type) {
            TaskType::Retrieval => {
                let mut p: RetrievalParams = serde_json::from_value(raw)
                    .context("invalid retrieval parameters")?;
                p.query = non_blank(p.query);
                p.focus_area = non_blank(p.focus_area);
                p.sources = p
                    .sources
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                TaskParams::Retrieval(p)
            }
            TaskType::Analysis => {
                let mut p: AnalysisParams =
                    serde_json::from_value(raw).context("invalid analysis parameters")?;
                p.focus = non_blank(p.focus);
                p.recommendation = non_blank(p.recommendation);
                TaskParams::Analysis(p)
            }
            TaskType::Synthesis => TaskParams::Synthesis(
                serde_json::from_value(raw).context("invalid synthesis parameters")?,
            ),
            TaskType::Verification => TaskParams::Verification(
                serde_json::from_value(raw).context("invalid verification parameters")?,
            ),
            TaskType::Calculation => {
                let mut p: CalculationParams =
                    serde_json::from_value(raw).context("invalid calculation parameters")?;
                p.expression = non_blank(p.expression);
                TaskParams::Calculation(p)
            }
            TaskType::Formatting => {
                let mut p: FormattingParams =
                    serde_json::from_value(raw).context("invalid formatting parameters")?;
                p.format = non_blank(p.format);
                TaskParams::Formatting(p)
            }
            TaskType::Unknown(name) => TaskParams::Unknown {
                task_type: name,
                raw: match raw {
                    Value::Object(map) => map,
                    _ => Map::new(),
                },
            },
        };
        Ok(params)
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskParams::Retrieval(_) => TaskType::Retrieval,
            TaskParams::Analysis(_) => TaskType::Analysis,
            TaskParams::Synthesis(_) => TaskType::Synthesis,
            TaskParams::Verification(_) => TaskType::Verification,
            TaskParams::Calculation(_) => TaskType::Calculation,
            TaskParams::Formatting(_) => TaskType::Formatting,
            TaskParams::Unknown { task_type, .. } => TaskType::Unknown(task_type.clone()),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// ═══════════════════════════════════════════════════════════════════════
// Task
// ═══════════════════════════════════════════════════════════════════════

/// Execution status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One unit of planned work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// 1 = highest, 5 = lowest.
    pub priority: u8,
    /// Ids of tasks in the same graph that must be attempted first.
    pub dependencies: BTreeSet<String>,
    pub params: TaskParams,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Task {
    /// Create a pending task, validating id, description, and priority.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        priority: u8,
        params: TaskParams,
    ) -> Result<Self> {
        let id = id.into();
        let description = description.into();
        if id.trim().is_empty() {
            bail!("task id must not be empty");
        }
        if description.trim().is_empty() {
            bail!("task '{}' has an empty description", id);
        }
        if !(HIGHEST_PRIORITY..=LOWEST_PRIORITY).contains(&priority) {
            bail!(
                "task '{}' priority {} is outside {}..={}",
                id,
                priority,
                HIGHEST_PRIORITY,
                LOWEST_PRIORITY
            );
        }
        Ok(Self {
            id,
            description,
            priority,
            dependencies: BTreeSet::new(),
            params,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        })
    }

    /// Convenience constructor for a retrieval task over `query`.
    pub fn retrieval(
        id: impl Into<String>,
        description: impl Into<String>,
        priority: u8,
        query: impl Into<String>,
    ) -> Result<Self> {
        let params = TaskParams::Retrieval(RetrievalParams {
            query: Some(query.into()),
            ..Default::default()
        });
        Self::new(id, description, priority, params)
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn task_type(&self) -> TaskType {
        self.params.task_type()
    }

    /// Mark the task as running.
    pub fn start(&mut self) -> Result<()> {
        if self.status != TaskStatus::Pending {
            bail!("task '{}' cannot start from status {}", self.id, self.status);
        }
        self.status = TaskStatus::InProgress;
        Ok(())
    }

    /// Record a successful result. Terminal afterwards.
    pub fn complete(&mut self, result: Value) -> Result<()> {
        if self.status.is_terminal() {
            bail!("task '{}' is already {}", self.id, self.status);
        }
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        Ok(())
    }

    /// Record a failure. Terminal afterwards.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            bail!("task '{}' is already {}", self.id, self.status);
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        Ok(())
    }
}

impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Task", 9)?;
        s.serialize_field("task_id", &self.id)?;
        s.serialize_field("task_type", &self.task_type())?;
        s.serialize_field("description", &self.description)?;
        s.serialize_field("priority", &self.priority)?;
        s.serialize_field("dependencies", &self.dependencies)?;
        s.serialize_field("parameters", &self.params)?;
        s.serialize_field("status", &self.status)?;
        s.serialize_field("result", &self.result)?;
        s.serialize_field("error", &self.error)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_type_parsing_is_case_insensitive() {
        assert_eq!(TaskType::from("Retrieval"), TaskType::Retrieval);
        assert_eq!(TaskType::from(" analysis "), TaskType::Analysis);
        assert_eq!(
            TaskType::from("web_search"),
            TaskType::Unknown("web_search".to_string())
        );
    }

    #[test]
    fn test_params_from_raw_normalizes_blank_query() {
        let params = TaskParams::from_raw("retrieval", json!({"query": "   "})).unwrap();
        match params {
            TaskParams::Retrieval(p) => assert!(p.query.is_none()),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_retrieval_sources_trimmed() {
        let params = TaskParams::from_raw(
            "retrieval",
            json!({"query": "rates", "sources": [" Rates ", "", "   "]}),
        )
        .unwrap();
        match params {
            TaskParams::Retrieval(p) => assert_eq!(p.sources, vec!["Rates"]),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_params_from_raw_null_is_default() {
        let params = TaskParams::from_raw("formatting", Value::Null).unwrap();
        match params {
            TaskParams::Formatting(p) => assert_eq!(p.format(), "standard"),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_params_from_raw_rejects_non_object() {
        assert!(TaskParams::from_raw("analysis", json!(["a", "b"])).is_err());
    }

    #[test]
    fn test_unknown_type_keeps_name_and_raw_params() {
        let params = TaskParams::from_raw("web_search", json!({"url": "x"})).unwrap();
        assert_eq!(params.task_type(), TaskType::Unknown("web_search".into()));
        let serialized = serde_json::to_value(&params).unwrap();
        assert_eq!(serialized, json!({"url": "x"}));
    }

    #[test]
    fn test_calculation_type_field_renamed() {
        let params =
            TaskParams::from_raw("calculation", json!({"type": "comparison", "expression": "1+2"}))
                .unwrap();
        match params {
            TaskParams::Calculation(p) => {
                assert_eq!(p.kind.as_deref(), Some("comparison"));
                assert_eq!(p.expression.as_deref(), Some("1+2"));
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_new_rejects_out_of_range_priority() {
        let params = TaskParams::Synthesis(SynthesisParams::default());
        assert!(Task::new("t1", "combine", 0, params.clone()).is_err());
        assert!(Task::new("t1", "combine", 6, params.clone()).is_err());
        assert!(Task::new("t1", "combine", 5, params).is_ok());
    }

    #[test]
    fn test_new_rejects_empty_description() {
        let params = TaskParams::Synthesis(SynthesisParams::default());
        assert!(Task::new("t1", "  ", 3, params).is_err());
    }

    #[test]
    fn test_terminal_tasks_are_immutable() {
        let mut task = Task::retrieval("t1", "find rates", 1, "rates").unwrap();
        task.start().unwrap();
        task.complete(json!({"documents_retrieved": 2})).unwrap();
        assert!(task.fail("late failure").is_err());
        assert!(task.complete(json!({})).is_err());
        assert!(task.start().is_err());
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.error.is_none());
    }

    #[test]
    fn test_task_serializes_derived_type() {
        let task = Task::retrieval("t1", "find rates", 2, "rates")
            .unwrap()
            .with_dependencies(["t0"]);
        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(v["task_type"], "retrieval");
        assert_eq!(v["status"], "pending");
        assert_eq!(v["parameters"]["query"], "rates");
        assert_eq!(v["dependencies"], json!(["t0"]));
    }

    #[test]
    fn test_short_id_shape() {
        let id = short_id("task_1");
        assert!(id.starts_with("task_1_"));
        assert_eq!(id.len(), "task_1_".len() + 8);
    }
}
