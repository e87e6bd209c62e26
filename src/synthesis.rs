//! Final answer synthesis from completed task results.

use agentic_rag_core::state::{Citation, WorkflowState};
use anyhow::Result;
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::executors::{retrieved_documents, UNPARSED_REPLY_CONFIDENCE};
use crate::llm::{parse_json_reply, truncate_chars, Prompt};

const SNIPPET_CHARS: usize = 200;
const MAX_RESULT_CHARS: usize = 3000;

/// The synthesized answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub confidence: f64,
    pub citations: Vec<Citation>,
    pub sources_used: Vec<String>,
}

/// Turns completed task results into a cited answer.
pub struct AnswerSynthesizer;

impl AnswerSynthesizer {
    /// Synthesize an answer from the completed tasks in `state`.
    ///
    /// With nothing completed no model call is made and the answer says so
    /// with confidence 0.0. When no completed task retrieved a document the
    /// model's answer is kept but its confidence is reported as 0.0 and no
    /// sources are claimed. A model
    /// error is returned to the caller.
    pub async fn synthesize(&self, state: &WorkflowState, ctx: &WorkflowContext) -> Result<Answer> {
        if state.completed().next().is_none() {
            return Ok(Answer {
                answer: format!(
                    "I could not find any information to answer your query: '{}'. \
                     No research step completed successfully.",
                    state.query
                ),
                confidence: 0.0,
                citations: Vec::new(),
                sources_used: Vec::new(),
            });
        }

        let reply = ctx.model.complete(&answer_prompt(state)).await?;
        let mut answer = match parse_json_reply(&reply) {
            Ok(value) if value.get("answer").and_then(Value::as_str).is_some() => {
                parse_answer(&value)
            }
            _ => {
                tracing::warn!("failed to parse answer response as JSON");
                Answer {
                    answer: reply.trim().to_string(),
                    confidence: UNPARSED_REPLY_CONFIDENCE,
                    citations: Vec::new(),
                    sources_used: Vec::new(),
                }
            }
        };

        if retrieved_documents(state).is_empty() {
            tracing::info!(
                reported = answer.confidence,
                "no documents retrieved, answer confidence set to 0.0"
            );
            answer.confidence = 0.0;
            answer.sources_used.clear();
        } else {
            merge_retrieval_sources(state, &mut answer);
        }
        Ok(answer)
    }
}

fn answer_prompt(state: &WorkflowState) -> Prompt {
    let mut user = format!("Original Query: {}\n\nTask Execution Results:\n", state.query);
    for task in state.completed() {
        let result = task
            .result
            .as_ref()
            .map(|r| truncate_chars(&r.to_string(), MAX_RESULT_CHARS))
            .unwrap_or_default();
        user.push_str(&format!(
            "- Task {} ({}): {}\n  Result: {}\n\n",
            task.id,
            task.task_type(),
            task.description,
            result
        ));
    }
    if let Some(c) = &state.user_context {
        user.push_str(&format!("User Context: {}\n\n", c));
    }
    user.push_str(
        "Please provide a comprehensive, accurate answer based on the task results above. \
         Include citations where appropriate.",
    );

    let system = "You are an expert assistant that synthesizes information from multiple task \
        results to provide comprehensive answers to user queries.\n\n\
        Respond with a JSON object:\n\
        {\"answer\": \"...\", \"confidence\": 0.0-1.0, \
        \"citations\": [{\"text\": \"cited text\", \"source\": \"source\", \"task_id\": \"task id\"}], \
        \"sources_used\": [\"...\"]}\n\n\
        Be honest about confidence. If information is incomplete or contradictory, say so.";

    Prompt::new(system, user)
}

fn parse_answer(value: &Value) -> Answer {
    let answer = value
        .get("answer")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.8);

    let citations = value
        .get("citations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| {
                    let text = |k: &str| c.get(k).and_then(Value::as_str).unwrap_or("").to_string();
                    let snippet = text("text");
                    let snippet = if snippet.is_empty() { text("snippet") } else { snippet };
                    if snippet.is_empty() {
                        return None;
                    }
                    let id = text("task_id");
                    Some(Citation {
                        id: if id.is_empty() { text("id") } else { id },
                        source: text("source"),
                        snippet,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let sources_used = value
        .get("sources_used")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Answer {
        answer,
        confidence,
        citations,
        sources_used,
    }
}

/// Add one citation per retrieved document and its source, without duplicates.
fn merge_retrieval_sources(state: &WorkflowState, answer: &mut Answer) {
    for doc in retrieved_documents(state) {
        let source = doc
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(&source)
            .to_string();
        let content = doc.get("content").and_then(Value::as_str).unwrap_or("");
        let citation = Citation {
            id,
            source: source.clone(),
            snippet: truncate_chars(content.trim(), SNIPPET_CHARS),
        };
        if !answer.citations.contains(&citation) {
            answer.citations.push(citation);
        }
        if !answer.sources_used.contains(&source) {
            answer.sources_used.push(source);
        }
    }
}
