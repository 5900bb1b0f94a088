// src/analyze/types.rs
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fully-populated structured judgment from one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub sentiment_score: f64,
    pub impact_score: f64,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub entities_mentioned: Vec<String>,
    pub is_crypto_related: bool,
}

/// Raw model output with every field optional. A partially-valid reply is
/// still usable: absent fields get documented defaults in the merge step,
/// so only `Annotation` ever crosses into consensus code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnnotation {
    pub sentiment_score: Option<f64>,
    pub impact_score: Option<f64>,
    pub categories: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub entities_mentioned: Option<Vec<String>>,
    pub is_crypto_related: Option<bool>,
}

impl RawAnnotation {
    /// Defaults for absent fields: neutral sentiment, mid impact, empty
    /// lists, crypto-related assumed true. Keywords are capped at 8.
    pub fn into_annotation(self, model: &str) -> Annotation {
        let mut missing: Vec<&str> = Vec::new();
        if self.sentiment_score.is_none() {
            missing.push("sentiment_score");
        }
        if self.impact_score.is_none() {
            missing.push("impact_score");
        }
        if self.categories.is_none() {
            missing.push("categories");
        }
        if self.keywords.is_none() {
            missing.push("keywords");
        }
        if self.entities_mentioned.is_none() {
            missing.push("entities_mentioned");
        }
        if self.is_crypto_related.is_none() {
            missing.push("is_crypto_related");
        }
        if !missing.is_empty() {
            warn!(model, ?missing, "missing fields in model response, defaulting");
        }

        let mut keywords = self.keywords.unwrap_or_default();
        keywords.truncate(8);

        Annotation {
            sentiment_score: self.sentiment_score.unwrap_or(0.0),
            impact_score: self.impact_score.unwrap_or(0.5),
            categories: self.categories.unwrap_or_default(),
            keywords,
            entities_mentioned: self.entities_mentioned.unwrap_or_default(),
            is_crypto_related: self.is_crypto_related.unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Success,
    /// The backend never produced a parsable completion.
    ApiError,
    /// The completion arrived but its JSON did not describe an annotation.
    ParseError,
    /// The spawned query task itself died.
    TaskFailed,
}

/// One model's answer for one text, attribution preserved.
#[derive(Debug, Clone)]
pub struct ModelVerdict {
    pub model: String,
    pub status: VerdictStatus,
    pub annotation: Option<Annotation>,
}

impl ModelVerdict {
    pub fn success(model: String, annotation: Annotation) -> Self {
        Self {
            model,
            status: VerdictStatus::Success,
            annotation: Some(annotation),
        }
    }

    pub fn failed(model: String, status: VerdictStatus) -> Self {
        Self {
            model,
            status,
            annotation: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == VerdictStatus::Success
    }
}
