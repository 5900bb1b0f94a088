//! OpenRouter chat-completion client with automatic key failover.
//!
//! One logical call retries across the key pool: transport errors and 5xx
//! rotate to the next key, 429s (HTTP status or embedded in a 200 body) also
//! park the offending key for its cooldown window. Exhausting the retry
//! budget yields `None`, never an error — callers treat absence as a failed
//! model and move on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::keys::{ApiKeyPool, RotateReason};

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const EXTRACT_TEMPERATURE: f32 = 0.1;
const SUMMARY_TEMPERATURE: f32 = 0.7;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("annotate_requests_total", "Chat-completion requests sent.");
        describe_counter!(
            "annotate_rate_limited_total",
            "Requests answered with a 429 signal."
        );
        describe_counter!(
            "annotate_failures_total",
            "Logical completions abandoned after the retry budget."
        );
    });
}

// ------------------------------------------------------------
// Wire types
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

// ------------------------------------------------------------
// Trait seam (the aggregator talks to this, tests stub it)
// ------------------------------------------------------------

#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Ask `model` for a JSON object; fence-stripped and parsed, or `None`.
    async fn extract_json(&self, model: &str, prompt: &str) -> Option<serde_json::Value>;
    /// Ask `model` for free-form text (first choice content), or `None`.
    async fn complete_text(&self, model: &str, prompt: &str) -> Option<String>;
}

pub type DynCompletionApi = Arc<dyn CompletionApi>;

// ------------------------------------------------------------
// Client
// ------------------------------------------------------------

pub struct OpenRouterApi {
    http: reqwest::Client,
    keys: Arc<ApiKeyPool>,
    api_url: String,
}

impl OpenRouterApi {
    pub fn new(keys: Arc<ApiKeyPool>) -> Self {
        Self::with_api_url(keys, OPENROUTER_API_URL)
    }

    /// `api_url` override lets tests point the client at a local stand-in.
    pub fn with_api_url(keys: Arc<ApiKeyPool>, api_url: &str) -> Self {
        ensure_metrics_described();
        let http = reqwest::Client::builder()
            .user_agent("crypto-pulse/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            keys,
            api_url: api_url.to_string(),
        }
    }

    /// One logical completion, retried across the key pool.
    ///
    /// Returns the parsed body on the first 2xx response with a well-formed
    /// payload; `None` once the attempt budget (`min(2 × pool, 10)`) runs out.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Option<ChatResponse> {
        let req = ChatRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };
        let max_attempts = self.keys.max_attempts();
        let mut attempts = 0usize;

        while attempts < max_attempts {
            let key = self.keys.current();
            counter!("annotate_requests_total").increment(1);

            let resp = match self
                .http
                .post(&self.api_url)
                .bearer_auth(&key)
                .json(&req)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = ?e, model, "transport error, rotating key");
                    self.keys.rotate(RotateReason::Failover);
                    attempts += 1;
                    continue;
                }
            };

            let status = resp.status();
            let body: serde_json::Value = match resp.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = ?e, model, "unreadable response body, rotating key");
                    self.keys.rotate(RotateReason::Failover);
                    attempts += 1;
                    continue;
                }
            };

            // Rate limit arrives either as the HTTP status or embedded in an
            // otherwise-200 body.
            if status.as_u16() == 429 || body_signals_rate_limit(&body) {
                warn!(model, "rate limit hit (429), rotating key");
                counter!("annotate_rate_limited_total").increment(1);
                self.keys.rotate(RotateReason::RateLimited);
                attempts += 1;
                continue;
            }

            if status.is_success() {
                match serde_json::from_value::<ChatResponse>(body) {
                    Ok(parsed) => return Some(parsed),
                    Err(e) => {
                        warn!(error = %e, model, "malformed completion body, rotating key");
                        self.keys.rotate(RotateReason::Failover);
                        attempts += 1;
                        continue;
                    }
                }
            }

            error!(status = %status, model, "API error, rotating key");
            self.keys.rotate(RotateReason::Failover);
            attempts += 1;
        }

        counter!("annotate_failures_total").increment(1);
        error!(model, attempts = max_attempts, "no successful response after retries");
        None
    }
}

#[async_trait]
impl CompletionApi for OpenRouterApi {
    async fn extract_json(&self, model: &str, prompt: &str) -> Option<serde_json::Value> {
        let messages = [ChatMessage::user(prompt)];
        let resp = self
            .chat_completion(model, &messages, EXTRACT_TEMPERATURE, None)
            .await?;
        let content = resp
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())?;
        parse_model_json(model, content)
    }

    async fn complete_text(&self, model: &str, prompt: &str) -> Option<String> {
        let messages = [ChatMessage::user(prompt)];
        let resp = self
            .chat_completion(model, &messages, SUMMARY_TEMPERATURE, None)
            .await?;
        resp.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(|s| s.trim().to_string())
    }
}

fn body_signals_rate_limit(body: &serde_json::Value) -> bool {
    let code_of = |v: &serde_json::Value| v.get("code").and_then(|c| c.as_i64());
    code_of(body) == Some(429) || body.get("error").and_then(code_of) == Some(429)
}

// ------------------------------------------------------------
// Fenced-JSON extraction
// ------------------------------------------------------------

/// Strip a leading ```` ```json ```` (language tag optional) and trailing
/// ```` ``` ```` fence. Content without fences passes through unchanged.
pub fn strip_json_fence(content: &str) -> String {
    static RE_OPEN: OnceCell<Regex> = OnceCell::new();
    static RE_CLOSE: OnceCell<Regex> = OnceCell::new();
    let re_open = RE_OPEN.get_or_init(|| Regex::new(r"^```(?:json)?\s*").unwrap());
    let re_close = RE_CLOSE.get_or_init(|| Regex::new(r"\s*```$").unwrap());

    let trimmed = content.trim();
    let opened = re_open.replace(trimmed, "");
    re_close.replace(&opened, "").to_string()
}

/// Parse a model's reply as JSON after fence stripping. Malformed output is
/// logged (first 200 chars) and swallowed.
pub fn parse_model_json(model: &str, content: &str) -> Option<serde_json::Value> {
    let cleaned = strip_json_fence(content);
    match serde_json::from_str(&cleaned) {
        Ok(v) => Some(v),
        Err(e) => {
            let preview: String = cleaned.chars().take(200).collect();
            error!(model, error = %e, %preview, "failed to parse JSON from model output");
            None
        }
    }
}
