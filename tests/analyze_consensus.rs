// tests/analyze_consensus.rs
// Aggregator semantics against a stubbed completion backend: median
// reduction, default merging, majority vote, and the neutral fallback.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crypto_pulse::analyze::{Consensus, ContentAnalyzer};
use crypto_pulse::config::ai::AiConfig;
use crypto_pulse::openrouter::CompletionApi;

/// Canned backend: each model id maps to the JSON it "extracts"; models
/// absent from the map fail (as if the retry budget ran out).
struct StubApi {
    responses: HashMap<String, serde_json::Value>,
    summary: Option<String>,
}

impl StubApi {
    fn new(responses: &[(&str, serde_json::Value)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(m, v)| (m.to_string(), v.clone()))
                .collect(),
            summary: None,
        }
    }

    fn with_summary(mut self, s: &str) -> Self {
        self.summary = Some(s.to_string());
        self
    }
}

#[async_trait]
impl CompletionApi for StubApi {
    async fn extract_json(&self, model: &str, _prompt: &str) -> Option<serde_json::Value> {
        self.responses.get(model).cloned()
    }

    async fn complete_text(&self, _model: &str, _prompt: &str) -> Option<String> {
        self.summary.clone()
    }
}

fn analyzer_for(models: &[&str], api: StubApi) -> ContentAnalyzer {
    let cfg = AiConfig {
        models: models.iter().map(|m| m.to_string()).collect(),
        models_per_analysis: None, // all of them
        ..AiConfig::default()
    };
    ContentAnalyzer::new(Arc::new(api), cfg)
}

fn full_response(sentiment: f64, impact: f64, crypto: bool) -> serde_json::Value {
    json!({
        "sentiment_score": sentiment,
        "impact_score": impact,
        "categories": ["market"],
        "keywords": ["btc"],
        "entities_mentioned": ["Bitcoin"],
        "is_crypto_related": crypto
    })
}

#[tokio::test]
async fn consensus_sentiment_is_the_median_odd() {
    let api = StubApi::new(&[
        ("m1", full_response(-1.0, 0.2, true)),
        ("m2", full_response(0.0, 0.5, true)),
        ("m3", full_response(1.0, 0.9, true)),
    ]);
    let analyzer = analyzer_for(&["m1", "m2", "m3"], api);
    let c = analyzer.analyze("Bitcoin news").await;
    assert_eq!(c.sentiment_score, 0.0);
    assert_eq!(c.impact_score, 0.5);
}

#[tokio::test]
async fn consensus_sentiment_is_the_median_even() {
    let api = StubApi::new(&[
        ("m1", full_response(0.2, 0.4, true)),
        ("m2", full_response(0.8, 0.6, true)),
    ]);
    let analyzer = analyzer_for(&["m1", "m2"], api);
    let c = analyzer.analyze("Bitcoin news").await;
    assert_eq!(c.sentiment_score, 0.5);
    assert_eq!(c.impact_score, 0.5);
}

#[tokio::test]
async fn missing_impact_score_is_filled_not_dropped() {
    // m1 omits impact_score entirely; the result must still count as valid
    // with the documented 0.5 default.
    let api = StubApi::new(&[(
        "m1",
        json!({
            "sentiment_score": 0.4,
            "categories": ["market"],
            "keywords": [],
            "entities_mentioned": [],
            "is_crypto_related": true
        }),
    )]);
    let analyzer = analyzer_for(&["m1"], api);
    let c = analyzer.analyze("ETH gas fees drop").await;
    assert_eq!(c.impact_score, 0.5);
    assert_eq!(c.sentiment_score, 0.4);
    assert!(c.is_crypto_related);
}

#[tokio::test]
async fn all_models_failing_yields_the_neutral_fallback() {
    let api = StubApi::new(&[]); // every model errors out
    let analyzer = analyzer_for(&["m1", "m2", "m3"], api);
    let c = analyzer.analyze("anything").await;
    assert_eq!(c, Consensus::neutral());
    assert!(!c.is_crypto_related, "no evidence means the item is noise");
}

#[tokio::test]
async fn one_failed_model_does_not_poison_the_consensus() {
    // 3 configured, 2 answer with crypto=true, 1 never responds.
    let api = StubApi::new(&[
        ("m1", full_response(0.6, 0.7, true)),
        ("m2", full_response(0.2, 0.3, true)),
    ]);
    let analyzer = analyzer_for(&["m1", "m2", "m3"], api);
    let c = analyzer.analyze("Exchange lists new token").await;
    assert!(c.is_crypto_related);
    assert_eq!(c.sentiment_score, (0.6 + 0.2) / 2.0);
    assert_eq!(c.categories, vec!["market".to_string()]);
}

#[tokio::test]
async fn relevance_vote_tie_rounds_to_true() {
    let api = StubApi::new(&[
        ("m1", full_response(0.1, 0.5, true)),
        ("m2", full_response(0.1, 0.5, false)),
    ]);
    let analyzer = analyzer_for(&["m1", "m2"], api);
    let c = analyzer.analyze("Could be about crypto").await;
    assert!(c.is_crypto_related);
}

#[tokio::test]
async fn non_object_json_is_a_parse_error_not_a_panic() {
    let api = StubApi::new(&[("m1", json!([1, 2, 3])), ("m2", full_response(0.3, 0.4, true))]);
    let analyzer = analyzer_for(&["m1", "m2"], api);
    let c = analyzer.analyze("text").await;
    // m1 is discarded, m2 carries the consensus alone
    assert_eq!(c.sentiment_score, 0.3);
}

#[tokio::test]
async fn summary_gets_prefix_and_source_link() {
    let api = StubApi::new(&[("m1", full_response(0.5, 0.5, true))])
        .with_summary("\"ETF inflows lift Bitcoin\"");
    let analyzer = analyzer_for(&["m1"], api);
    let c = analyzer.analyze("BTC ETF sees record inflows").await;
    let s = analyzer
        .generate_summary("BTC ETF sees record inflows", &c, Some("https://x.test/1"))
        .await;
    assert_eq!(
        s,
        "Market Intelligence: ETF inflows lift Bitcoin [Source](https://x.test/1)"
    );
}

#[tokio::test]
async fn failed_summary_is_an_empty_string() {
    let api = StubApi::new(&[("m1", full_response(0.5, 0.5, true))]);
    let analyzer = analyzer_for(&["m1"], api);
    let c = analyzer.analyze("text").await;
    let s = analyzer.generate_summary("text", &c, None).await;
    assert_eq!(s, "");
}

#[tokio::test]
async fn list_fields_pool_by_frequency_across_models() {
    let api = StubApi::new(&[
        (
            "m1",
            json!({
                "sentiment_score": 0.0, "impact_score": 0.5,
                "categories": ["market", "regulation"],
                "keywords": ["sec", "etf"],
                "entities_mentioned": ["Bitcoin"],
                "is_crypto_related": true
            }),
        ),
        (
            "m2",
            json!({
                "sentiment_score": 0.0, "impact_score": 0.5,
                "categories": ["regulation"],
                "keywords": ["etf"],
                "entities_mentioned": ["Bitcoin", "SEC"],
                "is_crypto_related": true
            }),
        ),
    ]);
    let analyzer = analyzer_for(&["m1", "m2"], api);
    let c = analyzer.analyze("SEC rules on the Bitcoin ETF").await;
    assert_eq!(c.categories[0], "regulation");
    assert_eq!(c.keywords[0], "etf");
    assert_eq!(c.entities_mentioned[0], "Bitcoin");
}
