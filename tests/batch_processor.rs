// tests/batch_processor.rs
// At-most-once batch semantics over the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;

use crypto_pulse::analyze::ContentAnalyzer;
use crypto_pulse::config::ai::AiConfig;
use crypto_pulse::history::History;
use crypto_pulse::openrouter::CompletionApi;
use crypto_pulse::process::BatchProcessor;
use crypto_pulse::store::memory::MemoryStore;
use crypto_pulse::store::{ContentStore, NewRawPost};

/// Backend that inspects the prompt text: posts mentioning "giveaway" are
/// judged not crypto-related, everything else is bullish crypto.
struct JudgingApi;

#[async_trait]
impl CompletionApi for JudgingApi {
    async fn extract_json(&self, _model: &str, prompt: &str) -> Option<serde_json::Value> {
        let crypto = !prompt.contains("giveaway");
        Some(json!({
            "sentiment_score": 0.5,
            "impact_score": 0.6,
            "categories": ["market"],
            "keywords": ["btc"],
            "entities_mentioned": ["Bitcoin"],
            "is_crypto_related": crypto
        }))
    }

    async fn complete_text(&self, _model: &str, _prompt: &str) -> Option<String> {
        Some("Market Intelligence: steady accumulation".to_string())
    }
}

fn processor_over(store: Arc<MemoryStore>) -> BatchProcessor {
    let cfg = AiConfig {
        models: vec!["m1".into(), "m2".into()],
        ..AiConfig::default()
    };
    let analyzer = ContentAnalyzer::new(Arc::new(JudgingApi), cfg);
    BatchProcessor::new(store, analyzer, Arc::new(History::with_capacity(100)))
}

fn post(account_id: i64, n: u32, text: &str, language: Option<&str>) -> NewRawPost {
    NewRawPost {
        account_id,
        external_id: format!("10{n}"),
        author_handle: "saylor".to_string(),
        text: text.to_string(),
        language: language.map(|s| s.to_string()),
        published_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, n).unwrap(),
        engagement: json!({}),
    }
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.seed_accounts(&["saylor"]).await.unwrap();
    store
}

#[tokio::test]
async fn persists_crypto_posts_and_reports_the_count() {
    let store = seeded_store().await;
    store.save_raw(post(1, 1, "Bitcoin to the moon", None)).await.unwrap();
    store.save_raw(post(1, 2, "ETH merge complete", Some("en"))).await.unwrap();

    let processor = processor_over(Arc::clone(&store));
    let persisted = processor.run(100).await;
    assert_eq!(persisted, 2);
    assert_eq!(store.processed_count().await.unwrap(), 2);

    let records = store.processed_snapshot();
    assert!(records[0].summary.starts_with("Market Intelligence:"));
    assert!(records[0]
        .summary
        .contains("https://twitter.com/saylor/status/101"));
}

#[tokio::test]
async fn rerun_with_no_new_posts_persists_nothing() {
    let store = seeded_store().await;
    store.save_raw(post(1, 1, "Bitcoin rally", None)).await.unwrap();

    let processor = processor_over(Arc::clone(&store));
    assert_eq!(processor.run(100).await, 1);
    // Idempotence: the same backlog must not be annotated twice.
    assert_eq!(processor.run(100).await, 0);
    assert_eq!(store.processed_count().await.unwrap(), 1);
}

#[tokio::test]
async fn non_crypto_posts_are_dropped_without_a_record() {
    let store = seeded_store().await;
    store.save_raw(post(1, 1, "Big giveaway this weekend", None)).await.unwrap();
    store.save_raw(post(1, 2, "BTC breaks resistance", None)).await.unwrap();

    let processor = processor_over(Arc::clone(&store));
    assert_eq!(processor.run(100).await, 1);
    let records = store.processed_snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].raw_post_id, 2);
}

#[tokio::test]
async fn non_target_languages_are_never_fetched() {
    let store = seeded_store().await;
    store.save_raw(post(1, 1, "Bitcoin nachrichten", Some("de"))).await.unwrap();
    store.save_raw(post(1, 2, "Bitcoin news", Some("en"))).await.unwrap();
    store.save_raw(post(1, 3, "Bitcoin maybe", Some("unknown"))).await.unwrap();

    let processor = processor_over(Arc::clone(&store));
    assert_eq!(processor.run(100).await, 2);
}

#[tokio::test]
async fn batch_limit_is_respected() {
    let store = seeded_store().await;
    for n in 1..=5 {
        store.save_raw(post(1, n, "Bitcoin content", None)).await.unwrap();
    }

    let processor = processor_over(Arc::clone(&store));
    assert_eq!(processor.run(2).await, 2);
    assert_eq!(processor.run(100).await, 3);
}
