// src/process.rs
//! Batch processor: drives the aggregator over the unprocessed backlog.
//!
//! Items are handled strictly one at a time — concurrency lives inside a
//! single `analyze` call — and each item gets its own persistence
//! transaction, so one bad item can never abort the batch.

use std::sync::Arc;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::analyze::ContentAnalyzer;
use crate::history::History;
use crate::store::{post_url, DynContentStore, ProcessedPost};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("process_runs_total", "Batch processing runs.");
        describe_counter!(
            "process_skipped_total",
            "Posts dropped by the relevance gate."
        );
        describe_counter!("process_persisted_total", "Processed records written.");
        describe_counter!(
            "process_errors_total",
            "Per-item persistence failures (batch continued)."
        );
    });
}

pub struct BatchProcessor {
    store: DynContentStore,
    analyzer: ContentAnalyzer,
    history: Arc<History>,
}

impl BatchProcessor {
    pub fn new(store: DynContentStore, analyzer: ContentAnalyzer, history: Arc<History>) -> Self {
        ensure_metrics_described();
        Self {
            store,
            analyzer,
            history,
        }
    }

    /// Annotate up to `limit` unprocessed posts. Posts the consensus deems
    /// not crypto-related are dropped without a record (they will be
    /// re-fetched next run, which is the retry path after a total model
    /// outage). Returns how many records were persisted.
    pub async fn run(&self, limit: i64) -> usize {
        counter!("process_runs_total").increment(1);

        let batch = match self.store.fetch_unprocessed(limit).await {
            Ok(b) => b,
            Err(e) => {
                error!(error = ?e, "failed to fetch unprocessed posts");
                return 0;
            }
        };
        info!(count = batch.len(), "found unprocessed posts");

        let mut persisted = 0usize;
        for post in batch {
            let consensus = self.analyzer.analyze(&post.text).await;

            if !consensus.is_crypto_related {
                info!(post_id = post.id, "skipping non-crypto post");
                counter!("process_skipped_total").increment(1);
                continue;
            }

            let url = post_url(&post.author_handle, &post.external_id);
            let summary = self
                .analyzer
                .generate_summary(&post.text, &consensus, Some(&url))
                .await;

            let record = ProcessedPost {
                raw_post_id: post.id,
                sentiment_score: consensus.sentiment_score,
                impact_score: consensus.impact_score,
                categories: consensus.categories.clone(),
                keywords: consensus.keywords.clone(),
                entities_mentioned: consensus.entities_mentioned.clone(),
                summary: summary.clone(),
            };

            match self.store.persist_processed(record).await {
                Ok(()) => {
                    persisted += 1;
                    counter!("process_persisted_total").increment(1);
                    self.history
                        .push(post.id, consensus.sentiment_score, &summary);
                    info!(post_id = post.id, source = %url, "processed post");
                }
                Err(e) => {
                    // Transaction already rolled back on drop; move on.
                    error!(error = ?e, post_id = post.id, "failed to persist processed post");
                    counter!("process_errors_total").increment(1);
                }
            }
        }

        info!(persisted, "batch processing finished");
        persisted
    }
}
