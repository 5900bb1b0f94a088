// src/analyze/consensus.rs
//! Pure reduction of N model annotations into one consensus record.
//! Median for scores (robust to one outlier model), frequency-ranked pooling
//! for the list fields, majority vote for the relevance flag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::Annotation;

pub const MAX_CATEGORIES: usize = 5;
pub const MAX_KEYWORDS: usize = 8;
pub const MAX_ENTITIES: usize = 5;

/// The single reduced judgment about one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub sentiment_score: f64,
    pub impact_score: f64,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub entities_mentioned: Vec<String>,
    pub is_crypto_related: bool,
}

impl Consensus {
    /// Fallback when every model failed: neutral scores, empty lists, and
    /// not crypto-related — with no evidence the item is treated as noise
    /// and left unprocessed for a later batch to retry.
    pub fn neutral() -> Self {
        Self {
            sentiment_score: 0.0,
            impact_score: 0.0,
            categories: Vec::new(),
            keywords: Vec::new(),
            entities_mentioned: Vec::new(),
            is_crypto_related: false,
        }
    }
}

/// Statistical median; even-length sets average the two middle values.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Top `k` items by descending frequency; ties keep first-seen order.
pub fn top_by_frequency(items: &[String], k: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new(); // item -> (count, first index)
    for (i, item) in items.iter().enumerate() {
        let entry = counts.entry(item.as_str()).or_insert((0, i));
        entry.0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> =
        counts.into_iter().map(|(s, (c, i))| (s, c, i)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(k)
        .map(|(s, _, _)| s.to_string())
        .collect()
}

/// Majority vote; ties round to true (`true_votes >= total / 2`).
pub fn majority_true(votes: &[bool]) -> bool {
    let true_votes = votes.iter().filter(|v| **v).count();
    true_votes * 2 >= votes.len()
}

/// Reduce the surviving annotations. Finishing order of the underlying
/// model calls does not matter: every operation here is order-independent
/// apart from the documented first-seen tie-break.
pub fn reduce(valid: &[Annotation]) -> Consensus {
    if valid.is_empty() {
        return Consensus::neutral();
    }

    let sentiments: Vec<f64> = valid.iter().map(|a| a.sentiment_score).collect();
    let impacts: Vec<f64> = valid.iter().map(|a| a.impact_score).collect();

    let mut all_categories = Vec::new();
    let mut all_keywords = Vec::new();
    let mut all_entities = Vec::new();
    let mut votes = Vec::with_capacity(valid.len());
    for a in valid {
        all_categories.extend(a.categories.iter().cloned());
        all_keywords.extend(a.keywords.iter().cloned());
        all_entities.extend(a.entities_mentioned.iter().cloned());
        votes.push(a.is_crypto_related);
    }

    let mut categories = top_by_frequency(&all_categories, MAX_CATEGORIES);
    if categories.is_empty() {
        categories.push("general".to_string());
    }

    Consensus {
        sentiment_score: median(&sentiments),
        impact_score: median(&impacts),
        categories,
        keywords: top_by_frequency(&all_keywords, MAX_KEYWORDS),
        entities_mentioned: top_by_frequency(&all_entities, MAX_ENTITIES),
        is_crypto_related: majority_true(&votes),
    }
}
