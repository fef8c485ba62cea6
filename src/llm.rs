//! LLM-backed event and description generation.
//!
//! The selector only sees the [`Generator`] capability. [`LlmBackend`] is the
//! production implementation: enum dispatch over an OpenAI-compatible chat
//! completions API, the Anthropic Messages API, or a disabled backend used
//! when no key is configured.

use crate::config::{api_key_from_env, BackendType, LlmConfig};
use crate::error::{PlannerError, Result};
use crate::models::{EventDraft, FilterConstraints};
use tracing::warn;

/// Parameters for a supplemental generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub count: usize,
    pub constraints: FilterConstraints,
    pub existing_names: Vec<String>,
    pub remaining_budget: f64,
    pub per_event_budget: f64,
}

/// External generator of supplemental events and event descriptions.
#[allow(async_fn_in_trait)]
pub trait Generator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<EventDraft>>;

    async fn describe(&self, name: &str, event_type: &str) -> Result<String>;
}

pub enum LlmBackend {
    OpenAi(ChatClient),
    Anthropic(ChatClient),
    Disabled,
}

pub struct ChatClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl LlmBackend {
    /// Build a backend from config; falls back to `Disabled` without a key.
    pub fn from_config(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::Disabled;
        };
        let Some(api_key) = api_key_from_env(&config.api_key_env) else {
            warn!(env = %config.api_key_env, "LLM API key not set, generation disabled");
            return Self::Disabled;
        };
        let client = ChatClient {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        };
        match config.backend {
            BackendType::OpenAi => Self::OpenAi(client),
            BackendType::Anthropic => Self::Anthropic(client),
        }
    }

    pub const fn name(&self) -> &str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
            Self::Disabled => "disabled",
        }
    }

    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        match self {
            Self::OpenAi(client) => client.complete_openai(system, user, max_tokens).await,
            Self::Anthropic(client) => client.complete_anthropic(system, user, max_tokens).await,
            Self::Disabled => Err(PlannerError::Generator("no LLM backend configured".to_string())),
        }
    }
}

impl Generator for LlmBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<EventDraft>> {
        let text = self
            .complete(GENERATE_SYSTEM_PROMPT, &generation_prompt(request), 1500)
            .await?;
        parse_drafts(&text)
    }

    async fn describe(&self, name: &str, event_type: &str) -> Result<String> {
        let text = self
            .complete(DESCRIBE_SYSTEM_PROMPT, &description_prompt(name, event_type), 200)
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(PlannerError::Generator("empty description".to_string()));
        }
        Ok(text.to_string())
    }
}

impl ChatClient {
    async fn complete_openai(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": 0.7,
            "max_tokens": max_tokens
        });
        let request = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        let json = send(request, "OpenAI").await?;
        extract_openai_content(&json)
    }

    async fn complete_anthropic(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}]
        });
        let request = self
            .client
            .post(format!("{}/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body);
        let json = send(request, "Anthropic").await?;
        extract_anthropic_content(&json)
    }
}

async fn send(request: reqwest::RequestBuilder, provider: &str) -> Result<serde_json::Value> {
    let response = request
        .send()
        .await
        .map_err(|e| PlannerError::Generator(format!("{} request failed: {}", provider, e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        return Err(PlannerError::Generator(format!("{} returned {}: {}", provider, status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| PlannerError::Generator(format!("{} response parse failed: {}", provider, e)))
}

fn extract_openai_content(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| PlannerError::Generator("OpenAI response missing choices[0].message.content".to_string()))
}

fn extract_anthropic_content(json: &serde_json::Value) -> Result<String> {
    json.pointer("/content/0/text")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| PlannerError::Generator("Anthropic response missing content[0].text".to_string()))
}

const GENERATE_SYSTEM_PROMPT: &str = "You plan college fest events. \
Reply with a JSON array only, no prose. Each element must have the keys \
name, type, cost, popularity, attendance, hashtag_mentions, feedback_score, avg_positive_sentiment.";

const DESCRIBE_SYSTEM_PROMPT: &str = "You write short, upbeat explanations of why an event \
belongs in a college fest. Reply with two sentences of plain text.";

fn generation_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "Propose {} new college fest events.\n\
         Each event should cost at most {:.2}; all of them together at most {:.2}.\n\
         popularity and feedback_score are on a 1-10 scale, avg_positive_sentiment in [0, 1], \
         attendance and hashtag_mentions are non-negative integers.\n",
        request.count, request.per_event_budget, request.remaining_budget
    );
    if let Some(types) = &request.constraints.event_types {
        let types: Vec<&str> = types.iter().map(String::as_str).collect();
        prompt.push_str(&format!("Allowed event types: {}.\n", types.join(", ")));
    }
    if let Some(min) = request.constraints.min_popularity {
        prompt.push_str(&format!("Popularity must be at least {}.\n", min));
    }
    if let Some(min) = request.constraints.min_sentiment {
        prompt.push_str(&format!("avg_positive_sentiment must be at least {}.\n", min));
    }
    if !request.existing_names.is_empty() {
        prompt.push_str(&format!(
            "Do not reuse these event names: {}.\n",
            request.existing_names.join(", ")
        ));
    }
    prompt
}

fn description_prompt(name: &str, event_type: &str) -> String {
    format!(
        "Explain why the {} event \"{}\" would engage students at a college fest.",
        event_type, name
    )
}

/// Extract drafts from a model reply.
///
/// Accepts a JSON array or an object with an `events` array, optionally inside
/// a markdown code block. Elements that do not deserialize are dropped.
pub fn parse_drafts(raw: &str) -> Result<Vec<EventDraft>> {
    let trimmed = raw.trim();
    let candidate = extract_json_from_codeblock(trimmed).unwrap_or(trimmed);

    let value: serde_json::Value = serde_json::from_str(candidate)
        .map_err(|e| PlannerError::Generator(format!("generator reply is not JSON: {}", e)))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("events") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err(PlannerError::Generator("generator reply has no events array".to_string())),
        },
        _ => return Err(PlannerError::Generator("generator reply is not an array".to_string())),
    };

    let mut drafts = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<EventDraft>(item) {
            Ok(draft) => drafts.push(draft),
            Err(e) => warn!(error = %e, "dropping malformed draft"),
        }
    }
    Ok(drafts)
}

fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n').map_or(0, |i| i + 1);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}
