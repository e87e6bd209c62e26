//! Language-model abstraction and implementations.
//!
//! - **[`DisabledModel`]**: always errors; every model-dependent step then
//!   takes its fallback path (fallback plan, heuristic reflection, apology).
//! - **[`OpenAiChatModel`]**: calls an OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint with retry and backoff.
//!
//! Replies are free text. Callers that expect JSON use [`parse_json_reply`],
//! which tolerates code fences and prose around the object.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::openai;

/// A system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// A text-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier used in logs.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

// ═══════════════════════════════════════════════════════════════════════
// Disabled
// ═══════════════════════════════════════════════════════════════════════

/// Used when `llm.provider = "disabled"`.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String> {
        bail!("Language model provider is disabled")
    }
}

// ═══════════════════════════════════════════════════════════════════════
// OpenAI-compatible chat
// ═══════════════════════════════════════════════════════════════════════

pub struct OpenAiChatModel {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    /// # Errors
    ///
    /// Returns an error if `model` is not set or the API key variable is
    /// missing from the environment.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = openai::api_key(&config.api_key_env)?;
        Ok(Self {
            model,
            url: openai::endpoint(&config.base_url, "chat/completions"),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: openai::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        });
        tracing::debug!(
            model = %self.model,
            prompt_chars = prompt.system.len() + prompt.user.len(),
            "sending chat completion"
        );

        let response =
            openai::post_json(&self.client, &self.url, &self.api_key, &body, self.max_retries)
                .await?;
        let content = response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Invalid chat response: missing choices[0].message.content"))?;
        Ok(content.to_string())
    }
}

/// Create the configured [`LanguageModel`].
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(OpenAiChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Reply parsing
// ═══════════════════════════════════════════════════════════════════════

/// Parse a model reply that should contain one JSON object.
///
/// Code fences are stripped and the text between the first `{` and the
/// last `}` is parsed.
pub fn parse_json_reply(reply: &str) -> Result<Value> {
    let text = strip_code_fences(reply);
    let start = text
        .find('{')
        .ok_or_else(|| anyhow!("no JSON object in model reply"))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| anyhow!("no JSON object in model reply"))?;
    if end <= start {
        bail!("no JSON object in model reply");
    }
    let value: Value =
        serde_json::from_str(&text[start..=end]).context("model reply is not valid JSON")?;
    Ok(value)
}

fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, e.g. ```json
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}

/// Shorten text for logs and prompts, marking the cut.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}
