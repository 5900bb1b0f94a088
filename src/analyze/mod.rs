// src/analyze/mod.rs
//! Multi-model annotation: fan one text out to several models concurrently,
//! reduce whatever survives into a consensus record, and narrate it.
//!
//! No failure mode escapes `analyze` — every path degrades to a documented
//! default so the batch processor never needs per-item error handling.

pub mod consensus;
pub mod types;

use std::sync::Arc;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use rand::seq::IndexedRandom;
use regex::Regex;
use tracing::{debug, error, warn};

use crate::config::ai::AiConfig;
use crate::openrouter::DynCompletionApi;

pub use consensus::Consensus;
pub use types::{Annotation, ModelVerdict, RawAnnotation, VerdictStatus};

pub const SUMMARY_PREFIX: &str = "Market Intelligence:";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("analyze_runs_total", "Texts run through the aggregator.");
        describe_counter!(
            "analyze_model_failures_total",
            "Individual model queries that produced no usable annotation."
        );
        describe_counter!(
            "analyze_all_failed_total",
            "Analyses where every model failed (neutral fallback used)."
        );
        describe_counter!("summary_failures_total", "Summary completions that failed.");
    });
}

/// Converts one text into one [`Consensus`], masking individual model
/// failures. Holds the trait-object client so tests can stub the backend.
pub struct ContentAnalyzer {
    api: DynCompletionApi,
    cfg: AiConfig,
}

impl ContentAnalyzer {
    pub fn new(api: DynCompletionApi, cfg: AiConfig) -> Self {
        ensure_metrics_described();
        Self { api, cfg }
    }

    /// Query a uniform-random subset of the configured models concurrently,
    /// wait for all of them (fan-in barrier — the reduction needs the full
    /// set of survivors), and reduce.
    pub async fn analyze(&self, text: &str) -> Consensus {
        counter!("analyze_runs_total").increment(1);

        let picked: Vec<String> = self
            .cfg
            .models
            .choose_multiple(&mut rand::rng(), self.cfg.per_analysis_count())
            .cloned()
            .collect();
        debug!(models = ?picked, "models selected for analysis");

        let mut tasks = Vec::with_capacity(picked.len());
        for model in picked {
            let api = Arc::clone(&self.api);
            let prompt = annotation_prompt(text);
            let task_model = model.clone();
            tasks.push((
                model,
                tokio::spawn(async move { query_model(api, task_model, prompt).await }),
            ));
        }

        let mut verdicts = Vec::with_capacity(tasks.len());
        for (model, handle) in tasks {
            match handle.await {
                Ok(v) => verdicts.push(v),
                Err(e) => {
                    warn!(error = ?e, model, "model query task died");
                    verdicts.push(ModelVerdict::failed(model, VerdictStatus::TaskFailed));
                }
            }
        }

        let failed = verdicts.iter().filter(|v| !v.is_success()).count();
        if failed > 0 {
            counter!("analyze_model_failures_total").increment(failed as u64);
        }

        let valid: Vec<Annotation> = verdicts
            .into_iter()
            .filter_map(|v| v.annotation)
            .collect();

        if valid.is_empty() {
            let preview: String = text.chars().take(50).collect();
            warn!(%preview, "all models failed to analyze text");
            counter!("analyze_all_failed_total").increment(1);
            return Consensus::neutral();
        }

        consensus::reduce(&valid)
    }

    /// One extra single-model completion narrating the consensus. Returns an
    /// empty string on failure; the caller decides whether that is fatal.
    pub async fn generate_summary(
        &self,
        text: &str,
        consensus: &Consensus,
        source_url: Option<&str>,
    ) -> String {
        let prompt = summary_prompt(text, consensus);
        let Some(raw) = self
            .api
            .complete_text(&self.cfg.summary_model, &prompt)
            .await
        else {
            error!("failed to generate summary");
            counter!("summary_failures_total").increment(1);
            return String::new();
        };
        polish_summary(&raw, source_url)
    }
}

async fn query_model(api: DynCompletionApi, model: String, prompt: String) -> ModelVerdict {
    let Some(value) = api.extract_json(&model, &prompt).await else {
        warn!(model, "failed to get valid response from model");
        return ModelVerdict::failed(model, VerdictStatus::ApiError);
    };
    match serde_json::from_value::<RawAnnotation>(value) {
        Ok(raw) => {
            let annotation = raw.into_annotation(&model);
            ModelVerdict::success(model, annotation)
        }
        Err(e) => {
            warn!(error = %e, model, "model JSON did not describe an annotation");
            ModelVerdict::failed(model, VerdictStatus::ParseError)
        }
    }
}

// ------------------------------------------------------------
// Prompts
// ------------------------------------------------------------

fn annotation_prompt(text: &str) -> String {
    format!(
        r#"You are a cryptocurrency analysis algorithm. Your only task is to analyze the following crypto-related post and output a standardized JSON object.

Post: "{text}"

IMPORTANT: You must ONLY output valid JSON. Do not include any explanations, notes, or text outside the JSON object. Your entire response must be parseable as JSON.

Return this exact JSON structure with appropriate values:
{{
  "sentiment_score": [number between -1.0 and 1.0 where -1 is very negative, 0 is neutral, and 1 is very positive],
  "impact_score": [number between 0.0 and 1.0 representing potential market impact],
  "categories": [array of string categories like "market", "technology", "regulation", "security", etc.],
  "keywords": [array of up to 8 important string keywords from the text],
  "entities_mentioned": [array of string cryptocurrencies or crypto entities mentioned],
  "is_crypto_related": [boolean - true if crypto-related, false if not]
}}

REMINDER: Output ONLY the JSON object without any markdown formatting, explanations, or additional text.
"#
    )
}

fn summary_prompt(text: &str, c: &Consensus) -> String {
    let keywords = c
        .keywords
        .iter()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"You are a financial analyst writing concise crypto market intelligence.

Content: "{text}"

Analysis data (for context only):
- Sentiment: {sentiment}
- Impact: {impact}
- Categories: {categories}
- Entities: {entities}
- Keywords: {keywords}

Write ONE SHORT SENTENCE that begins with "{prefix}" capturing the most essential insight.
Be extremely concise (under 80 characters if possible).
Focus on the most significant aspect of the content.
NO explanations, markdown, or trailing dots.
"#,
        sentiment = c.sentiment_score,
        impact = c.impact_score,
        categories = c.categories.join(", "),
        entities = c.entities_mentioned.join(", "),
        prefix = SUMMARY_PREFIX,
    )
}

/// Enforce the fixed prefix, drop wrapping quotes, append the source link.
pub fn polish_summary(raw: &str, source_url: Option<&str>) -> String {
    static RE_QUOTES: OnceCell<Regex> = OnceCell::new();
    let re_quotes = RE_QUOTES.get_or_init(|| Regex::new(r#"^"|"$"#).unwrap());

    let mut summary = re_quotes.replace_all(raw.trim(), "").to_string();
    if !summary.starts_with(SUMMARY_PREFIX) {
        summary = format!("{SUMMARY_PREFIX} {summary}");
    }
    if let Some(url) = source_url {
        summary = format!("{summary} [Source]({url})");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prefix_is_prepended_when_missing() {
        let s = polish_summary("Bitcoin rallies on ETF inflows", None);
        assert_eq!(s, "Market Intelligence: Bitcoin rallies on ETF inflows");
    }

    #[test]
    fn existing_prefix_is_kept() {
        let s = polish_summary("Market Intelligence: flat day", None);
        assert_eq!(s, "Market Intelligence: flat day");
    }

    #[test]
    fn wrapping_quotes_are_stripped_and_link_appended() {
        let s = polish_summary(
            "\"Market Intelligence: ETH upgrade lands\"",
            Some("https://x.com/ethereum/status/1"),
        );
        assert_eq!(
            s,
            "Market Intelligence: ETH upgrade lands [Source](https://x.com/ethereum/status/1)"
        );
    }
}
