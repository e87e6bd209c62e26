//! Post-execution quality check.
//!
//! The reflector grades the current answer and decides whether another
//! orchestration round is worth running. When it is, [`follow_up_tasks`]
//! turns the verdict's gaps and recommendations into new tasks.

use agentic_rag_core::state::{Quality, ReflectionVerdict, WorkflowState};
use agentic_rag_core::task::{
    short_id, AnalysisParams, RetrievalParams, Task, TaskParams, TaskStatus,
};
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::llm::{parse_json_reply, truncate_chars, Prompt};

/// At most this many gap-filling retrieval tasks per round.
pub const MAX_GAP_TASKS: usize = 3;
/// At most this many recommendation analysis tasks per round.
pub const MAX_RECOMMENDATION_TASKS: usize = 2;

const GAP_TASK_PRIORITY: u8 = 1;
const RECOMMENDATION_TASK_PRIORITY: u8 = 2;
const RESULT_PREVIEW_CHARS: usize = 200;
const ANSWER_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAssessment {
    quality_assessment: Option<String>,
    completeness_score: Option<f64>,
    accuracy_score: Option<f64>,
    relevance_score: Option<f64>,
    needs_more_research: Option<bool>,
    missing_aspects: Vec<String>,
    recommendations: Vec<String>,
    reasoning: String,
}

pub struct Reflector {
    threshold: f64,
}

impl Reflector {
    /// `threshold` is the minimum acceptable completeness, accuracy and
    /// relevance score.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Grade the current state of the run.
    ///
    /// A model error is returned. An unparsable reply falls back to a
    /// heuristic over the answer's confidence and source count.
    pub async fn reflect(
        &self,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<ReflectionVerdict> {
        tracing::info!(iteration = state.iteration, "reflecting on execution results");
        let reply = ctx.model.complete(&reflection_prompt(state)).await?;

        let verdict = match parse_json_reply(&reply)
            .and_then(|v| Ok(serde_json::from_value::<RawAssessment>(v)?))
        {
            Ok(raw) => self.verdict_from(state, raw),
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse reflection reply, using heuristic");
                heuristic_verdict(state)
            }
        };

        tracing::info!(
            quality = %verdict.quality_label(),
            needs_more_research = verdict.needs_more_research,
            "reflection complete"
        );
        Ok(verdict)
    }

    fn verdict_from(&self, state: &WorkflowState, raw: RawAssessment) -> ReflectionVerdict {
        let quality = raw
            .quality_assessment
            .as_deref()
            .and_then(Quality::parse_lenient);
        let score = |s: Option<f64>| s.unwrap_or(state.confidence).clamp(0.0, 1.0);
        let completeness = score(raw.completeness_score);
        let accuracy = score(raw.accuracy_score);
        let relevance = score(raw.relevance_score);

        let below_threshold = [completeness, accuracy, relevance]
            .iter()
            .any(|s| *s < self.threshold);
        let needs_more_research = raw.needs_more_research.unwrap_or(false)
            || quality.is_some_and(Quality::is_below_adequate)
            || below_threshold;

        ReflectionVerdict {
            iteration: state.iteration,
            quality,
            completeness_score: completeness,
            accuracy_score: accuracy,
            relevance_score: relevance,
            needs_more_research,
            missing_aspects: non_blank(raw.missing_aspects),
            recommendations: non_blank(raw.recommendations),
            additional_tasks: Vec::new(),
            reasoning: raw.reasoning,
            heuristic: false,
            error: None,
        }
    }
}

impl Default for Reflector {
    fn default() -> Self {
        Self::new(0.6)
    }
}

fn non_blank(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Verdict derived from the answer's confidence alone.
pub fn heuristic_verdict(state: &WorkflowState) -> ReflectionVerdict {
    let confidence = state.confidence.clamp(0.0, 1.0);
    let (quality, needs_more_research) = if confidence >= 0.8 {
        (Quality::Good, false)
    } else if confidence >= 0.6 {
        (Quality::Adequate, state.sources_used.len() < 2)
    } else {
        (Quality::Poor, true)
    };

    let (missing_aspects, recommendations) = if needs_more_research {
        (
            vec!["additional verification".to_string()],
            vec!["Seek additional sources".to_string()],
        )
    } else {
        (Vec::new(), Vec::new())
    };

    ReflectionVerdict {
        iteration: state.iteration,
        quality: Some(quality),
        completeness_score: confidence,
        accuracy_score: confidence,
        relevance_score: confidence,
        needs_more_research,
        missing_aspects,
        recommendations,
        additional_tasks: Vec::new(),
        reasoning: "Fallback analysis based on confidence score".to_string(),
        heuristic: true,
        error: None,
    }
}

/// Tasks that address the verdict's missing aspects and recommendations.
///
/// Gap tasks are retrievals; recommendation tasks are analyses that depend
/// on every gap task of the same round.
pub fn follow_up_tasks(state: &WorkflowState, verdict: &ReflectionVerdict) -> Vec<Task> {
    let mut tasks = Vec::new();

    for (i, aspect) in verdict
        .missing_aspects
        .iter()
        .take(MAX_GAP_TASKS)
        .enumerate()
    {
        tasks.push(Task {
            id: short_id(&format!("reflection_task_{}", i + 1)),
            description: format!("Research additional information about: {}", aspect),
            priority: GAP_TASK_PRIORITY,
            dependencies: Default::default(),
            params: TaskParams::Retrieval(RetrievalParams {
                query: Some(format!("{} specifically about {}", state.query, aspect)),
                focus_area: Some(aspect.clone()),
                ..Default::default()
            }),
            status: TaskStatus::Pending,
            result: None,
            error: None,
        });
    }
    let gap_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();

    for (i, recommendation) in verdict
        .recommendations
        .iter()
        .take(MAX_RECOMMENDATION_TASKS)
        .enumerate()
    {
        tasks.push(Task {
            id: short_id(&format!("recommendation_task_{}", i + 1)),
            description: format!("Follow recommendation: {}", recommendation),
            priority: RECOMMENDATION_TASK_PRIORITY,
            dependencies: gap_ids.iter().cloned().collect(),
            params: TaskParams::Analysis(AnalysisParams {
                focus: None,
                recommendation: Some(recommendation.clone()),
            }),
            status: TaskStatus::Pending,
            result: None,
            error: None,
        });
    }

    tasks
}

fn reflection_prompt(state: &WorkflowState) -> Prompt {
    let mut ctx = vec![
        "EXECUTION SUMMARY:".to_string(),
        format!("- Total tasks planned: {}", state.tasks.len()),
        format!("- Tasks completed: {}", state.completed_tasks.len()),
        format!("- Tasks failed: {}", state.failed_tasks.len()),
        format!("- Current iteration: {}", state.iteration),
        String::new(),
        "TASK RESULTS:".to_string(),
    ];
    for task in &state.tasks {
        match task.status {
            TaskStatus::Completed => {
                ctx.push(format!("[ok] {}: {}", task.task_type(), task.description));
                if let Some(result) = &task.result {
                    ctx.push(format!(
                        "  Result: {}",
                        truncate_chars(&result_text(result), RESULT_PREVIEW_CHARS)
                    ));
                }
            }
            TaskStatus::Failed => {
                ctx.push(format!("[failed] {}: {}", task.task_type(), task.description));
                if let Some(e) = &task.error {
                    ctx.push(format!("  Error: {}", e));
                }
            }
            _ => {}
        }
    }
    ctx.push(String::new());
    ctx.push("FINAL ANSWER:".to_string());
    if state.final_answer.is_empty() {
        ctx.push("No answer generated".to_string());
    } else {
        ctx.push(truncate_chars(&state.final_answer, ANSWER_PREVIEW_CHARS));
    }
    ctx.push(String::new());
    ctx.push("QUALITY METRICS:".to_string());
    ctx.push(format!("- Confidence Score: {:.2}", state.confidence));
    ctx.push(format!("- Sources Used: {}", state.sources_used.len()));
    ctx.push(format!("- Citations: {}", state.citations.len()));

    let user = format!(
        "Please analyze the following execution results for the query: \"{}\"\n\n{}\n\n\
         Evaluate completeness, accuracy, relevance and overall quality.\n\n\
         Provide your analysis in JSON format:\n\
         {{\"quality_assessment\": \"excellent|good|adequate|poor|inadequate\", \
         \"completeness_score\": 0.0-1.0, \"accuracy_score\": 0.0-1.0, \
         \"relevance_score\": 0.0-1.0, \"needs_more_research\": true|false, \
         \"missing_aspects\": [\"...\"], \"recommendations\": [\"...\"], \
         \"reasoning\": \"...\"}}",
        state.query,
        ctx.join("\n")
    );

    let system = "You are an expert quality assessor for AI-generated answers. Critically \
        evaluate the completeness, accuracy and quality of answers generated by a \
        retrieval-augmented research system. Identify specific gaps and give actionable \
        recommendations. Recommend additional research if the answer is incomplete or \
        inaccurate.";

    Prompt::new(system, user)
}

fn result_text(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
