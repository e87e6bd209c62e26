//! Built-in executors for the six known task types.
//!
//! | Type | Input | Fails when |
//! |------|-------|-----------|
//! | retrieval | `params.query` or the original query | nothing retrieved |
//! | analysis | documents of completed retrieval tasks (first 5) | no documents |
//! | synthesis | completed analysis results | no analysis results |
//! | verification | all completed results | nothing completed |
//! | calculation | `params.expression`, else prior results via the model | bad expression / model error |
//! | formatting | all completed results | nothing completed |
//!
//! Model replies are parsed with [`parse_json_reply`]; an unparsable reply
//! becomes a text-wrapped result with confidence 0.7. A model call error
//! fails the task.

use agentic_rag_core::state::WorkflowState;
use agentic_rag_core::task::{RetrievalParams, Task, TaskParams, TaskType};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::calc;
use crate::context::WorkflowContext;
use crate::executor::TaskExecutor;
use crate::llm::{parse_json_reply, truncate_chars, Prompt};

/// Documents handed to a single analysis prompt.
pub const MAX_ANALYSIS_DOCUMENTS: usize = 5;

/// Confidence assigned to a model reply that could not be parsed as JSON.
pub const UNPARSED_REPLY_CONFIDENCE: f64 = 0.7;

const MAX_RESULT_CHARS: usize = 2000;

/// Ask the model for a JSON object, falling back to `wrap(reply)` when the
/// reply does not parse.
async fn ask_json(
    ctx: &WorkflowContext,
    prompt: Prompt,
    wrap: impl FnOnce(&str) -> Value + Send,
) -> Result<Value> {
    let reply = ctx.model.complete(&prompt).await?;
    match parse_json_reply(&reply) {
        Ok(value) if value.is_object() => Ok(value),
        _ => {
            tracing::warn!("model reply was not JSON, wrapping as text");
            Ok(wrap(&reply))
        }
    }
}

fn confidence_of(value: &Value, default: f64) -> f64 {
    value
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(default)
}

/// Completed results rendered for prompts, skipping `exclude`.
fn completed_results_text(state: &WorkflowState, exclude: &str) -> Vec<String> {
    state
        .completed()
        .filter(|t| t.id != exclude)
        .filter_map(|t| t.result.as_ref().map(|r| (t, r)))
        .enumerate()
        .map(|(i, (t, r))| {
            format!(
                "Information {} ({}): {}\nResult: {}\n",
                i + 1,
                t.task_type(),
                t.description,
                truncate_chars(&r.to_string(), MAX_RESULT_CHARS)
            )
        })
        .collect()
}

fn query_header(state: &WorkflowState) -> String {
    match &state.user_context {
        Some(c) => format!("Original Query: {}\nUser Context: {}\n", state.query, c),
        None => format!("Original Query: {}\n", state.query),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Retrieval
// ═══════════════════════════════════════════════════════════════════════

pub struct RetrievalExecutor;

#[async_trait]
impl TaskExecutor for RetrievalExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::Retrieval
    }

    async fn execute(
        &self,
        task: &Task,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<Value> {
        let default_params = RetrievalParams::default();
        let params = match &task.params {
            TaskParams::Retrieval(p) => p,
            _ => &default_params,
        };
        let query = params.query.clone().unwrap_or_else(|| state.query.clone());

        let retrieval = ctx
            .retriever
            .retrieve(&query, params.top_k, &params.sources)
            .await;
        if retrieval.results.is_empty() {
            bail!("no documents retrieved for query: {}", query);
        }

        let documents: Vec<Value> = retrieval
            .results
            .iter()
            .map(|r| {
                let meta = |key: &str| r.metadata.get(key).cloned().unwrap_or(Value::Null);
                json!({
                    "id": meta("id"),
                    "source": r.metadata.get("source").cloned().unwrap_or_else(|| json!("unknown")),
                    "title": meta("title"),
                    "content": r.content,
                    "relevance_score": r.hybrid_score,
                    "vector_score": r.vector_score,
                    "lexical_score": r.lexical_score,
                })
            })
            .collect();
        let confidence = retrieval
            .results
            .first()
            .map(|r| r.hybrid_score)
            .unwrap_or(0.0);

        Ok(json!({
            "query_used": query,
            "focus_area": params.focus_area,
            "sources_filter": params.sources,
            "documents_retrieved": documents.len(),
            "documents": documents,
            "retrieval_method": "hybrid",
            "retrieval_reasoning": retrieval.reasoning,
            "confidence": confidence,
        }))
    }
}

/// Documents from completed retrieval tasks, in graph order.
pub fn retrieved_documents(state: &WorkflowState) -> Vec<&Value> {
    state
        .completed_of_type(TaskType::Retrieval)
        .filter_map(|t| t.result.as_ref())
        .filter_map(|r| r.get("documents").and_then(Value::as_array))
        .flatten()
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Analysis
// ═══════════════════════════════════════════════════════════════════════

pub struct AnalysisExecutor;

#[async_trait]
impl TaskExecutor for AnalysisExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::Analysis
    }

    async fn execute(
        &self,
        task: &Task,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<Value> {
        let documents = retrieved_documents(state);
        if documents.is_empty() {
            bail!("No documents available for analysis");
        }

        let mut doc_content = String::new();
        for (i, doc) in documents.iter().take(MAX_ANALYSIS_DOCUMENTS).enumerate() {
            doc_content.push_str(&format!(
                "Document {} ({}):\n{}\n\n",
                i + 1,
                doc.get("source").and_then(Value::as_str).unwrap_or("Unknown"),
                doc.get("content").and_then(Value::as_str).unwrap_or("")
            ));
        }

        let mut focus = String::new();
        if let TaskParams::Analysis(p) = &task.params {
            if let Some(f) = &p.focus {
                focus.push_str(&format!("Focus: {}\n", f));
            }
            if let Some(r) = &p.recommendation {
                focus.push_str(&format!("Follow-up recommendation: {}\n", r));
            }
        }

        let user = format!(
            "Please analyze the following documents to answer the specific question: {}\n\n{}{}\nDocuments:\n{}\
             Provide your analysis in JSON format:\n\
             {{\"key_findings\": [\"finding1\", ...], \"relevant_information\": \"summary\", \
             \"confidence\": 0.0-1.0, \"sources_cited\": [\"source1\", ...]}}",
            task.description,
            query_header(state),
            focus,
            doc_content
        );
        let prompt = Prompt::new(
            "You are an expert document analyst. Analyze the provided documents thoroughly and extract relevant information.",
            user,
        );

        let sources: Vec<Value> = documents
            .iter()
            .take(MAX_ANALYSIS_DOCUMENTS)
            .filter_map(|d| d.get("source").cloned())
            .collect();
        let analysis = ask_json(ctx, prompt, move |reply| {
            json!({
                "key_findings": [reply],
                "relevant_information": reply,
                "confidence": UNPARSED_REPLY_CONFIDENCE,
                "sources_cited": sources,
            })
        })
        .await?;

        let key_findings = analysis
            .get("key_findings")
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(json!({
            "documents_analyzed": documents.len().min(MAX_ANALYSIS_DOCUMENTS),
            "confidence": confidence_of(&analysis, 0.8),
            "key_findings": key_findings,
            "analysis_result": analysis,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Synthesis
// ═══════════════════════════════════════════════════════════════════════

pub struct SynthesisExecutor;

#[async_trait]
impl TaskExecutor for SynthesisExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::Synthesis
    }

    async fn execute(
        &self,
        task: &Task,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<Value> {
        let analyses: Vec<&Value> = state
            .completed_of_type(TaskType::Analysis)
            .filter_map(|t| t.result.as_ref())
            .filter_map(|r| r.get("analysis_result"))
            .collect();
        if analyses.is_empty() {
            bail!("No analysis results available for synthesis");
        }

        let mut analysis_data = String::new();
        for (i, a) in analyses.iter().enumerate() {
            analysis_data.push_str(&format!(
                "Analysis {}:\n{}\nKey Findings: {}\n\n",
                i + 1,
                a.get("relevant_information")
                    .and_then(Value::as_str)
                    .unwrap_or(""),
                a.get("key_findings").cloned().unwrap_or_else(|| json!([]))
            ));
        }

        let focus = match &task.params {
            TaskParams::Synthesis(p) => p.focus.clone(),
            _ => None,
        }
        .map(|f| format!("Focus: {}\n", f))
        .unwrap_or_default();

        let user = format!(
            "Please synthesize the following analysis results to create a comprehensive understanding of: {}\n\n{}{}\nAnalysis Results:\n{}\
             Provide your synthesis in JSON format:\n\
             {{\"synthesized_information\": \"...\", \"key_insights\": [\"...\"], \
             \"confidence\": 0.0-1.0, \"supporting_evidence\": [\"...\"]}}",
            task.description,
            query_header(state),
            focus,
            analysis_data
        );
        let prompt = Prompt::new(
            "You are an expert at synthesizing information from multiple sources. Create a comprehensive and coherent synthesis.",
            user,
        );

        let synthesis = ask_json(ctx, prompt, |reply| {
            json!({
                "synthesized_information": reply,
                "key_insights": [reply],
                "confidence": UNPARSED_REPLY_CONFIDENCE,
                "supporting_evidence": [],
            })
        })
        .await?;

        Ok(json!({
            "sources_synthesized": analyses.len(),
            "confidence": confidence_of(&synthesis, 0.8),
            "synthesis_result": synthesis,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Verification
// ═══════════════════════════════════════════════════════════════════════

pub struct VerificationExecutor;

#[async_trait]
impl TaskExecutor for VerificationExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::Verification
    }

    async fn execute(
        &self,
        task: &Task,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<Value> {
        let information = completed_results_text(state, &task.id);
        if information.is_empty() {
            bail!("No information available for verification");
        }

        let claims = match &task.params {
            TaskParams::Verification(p) if !p.claims.is_empty() => format!(
                "Claims to check:\n{}\n",
                p.claims
                    .iter()
                    .map(|c| format!("- {}", c))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            _ => String::new(),
        };

        let user = format!(
            "Please verify the accuracy and consistency of the following information related to: {}\n\n{}{}\nInformation to Verify:\n{}\
             Provide your verification in JSON format:\n\
             {{\"verification_summary\": \"...\", \"accuracy_assessment\": \"high|medium|low\", \
             \"consistency_check\": \"consistent|inconsistent|partially_consistent\", \
             \"confidence\": 0.0-1.0, \"issues_found\": [], \"recommendations\": []}}",
            task.description,
            query_header(state),
            claims,
            information.concat()
        );
        let prompt = Prompt::new(
            "You are an expert at verifying information accuracy and consistency. Provide thorough verification analysis.",
            user,
        );

        let verification = ask_json(ctx, prompt, |reply| {
            json!({
                "verification_summary": reply,
                "accuracy_assessment": "medium",
                "consistency_check": "consistent",
                "confidence": UNPARSED_REPLY_CONFIDENCE,
                "issues_found": [],
                "recommendations": [],
            })
        })
        .await?;

        Ok(json!({
            "information_verified": information.len(),
            "confidence": confidence_of(&verification, 0.8),
            "verification_result": verification,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Calculation
// ═══════════════════════════════════════════════════════════════════════

pub struct CalculationExecutor;

#[async_trait]
impl TaskExecutor for CalculationExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::Calculation
    }

    async fn execute(
        &self,
        task: &Task,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<Value> {
        let (expression, kind) = match &task.params {
            TaskParams::Calculation(p) => (p.expression.clone(), p.kind.clone()),
            _ => (None, None),
        };
        let kind = kind.unwrap_or_else(|| "basic".to_string());

        if let Some(expression) = expression {
            let value = calc::evaluate(&expression)?;
            return Ok(json!({
                "calculation_type": kind,
                "calculation_result": {
                    "expression": expression,
                    "result": value,
                    "method": "expression",
                },
                "confidence": 1.0,
            }));
        }

        let information = completed_results_text(state, &task.id);
        let user = format!(
            "Perform the following calculation: {}\nCalculation type: {}\n\n{}\nAvailable Information:\n{}\
             Provide the result in JSON format:\n\
             {{\"result\": \"...\", \"working\": \"step-by-step working\", \"confidence\": 0.0-1.0}}",
            task.description,
            kind,
            query_header(state),
            if information.is_empty() {
                "(none)\n".to_string()
            } else {
                information.concat()
            }
        );
        let prompt = Prompt::new(
            "You are a careful analyst. Compute numerical results precisely and show your working.",
            user,
        );

        let calculation = ask_json(ctx, prompt, |reply| {
            json!({
                "result": reply,
                "working": "",
                "confidence": UNPARSED_REPLY_CONFIDENCE,
            })
        })
        .await?;

        let mut result = Map::new();
        result.insert("calculation_type".into(), json!(kind));
        result.insert("confidence".into(), json!(confidence_of(&calculation, 0.8)));
        result.insert("calculation_result".into(), calculation);
        if let Some(obj) = result.get_mut("calculation_result").and_then(Value::as_object_mut) {
            obj.insert("method".into(), json!("model"));
        }
        Ok(Value::Object(result))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Formatting
// ═══════════════════════════════════════════════════════════════════════

pub struct FormattingExecutor;

#[async_trait]
impl TaskExecutor for FormattingExecutor {
    fn task_type(&self) -> TaskType {
        TaskType::Formatting
    }

    async fn execute(
        &self,
        task: &Task,
        state: &WorkflowState,
        ctx: &WorkflowContext,
    ) -> Result<Value> {
        let content = completed_results_text(state, &task.id);
        if content.is_empty() {
            bail!("No content available for formatting");
        }

        let format_type = match &task.params {
            TaskParams::Formatting(p) => p.format().to_string(),
            _ => "standard".to_string(),
        };

        let user = format!(
            "Please format the following content according to the specified format: {}\n\n{}\nContent to Format:\n{}\
             Format Requirements: {}\n\n\
             Provide the formatted result in JSON format:\n\
             {{\"formatted_content\": \"...\", \"format_applied\": \"{}\", \
             \"structure_used\": \"...\", \"confidence\": 0.0-1.0}}",
            format_type,
            query_header(state),
            content.concat(),
            task.description,
            format_type
        );
        let prompt = Prompt::new(
            "You are an expert at formatting content for different purposes. Apply the requested formatting professionally.",
            user,
        );

        let fallback_format = format_type.clone();
        let formatted = ask_json(ctx, prompt, move |reply| {
            json!({
                "formatted_content": reply,
                "format_applied": fallback_format,
                "structure_used": "default",
                "confidence": UNPARSED_REPLY_CONFIDENCE,
            })
        })
        .await?;

        Ok(json!({
            "format_type": format_type,
            "confidence": confidence_of(&formatted, 0.8),
            "formatted_result": formatted,
        }))
    }
}
