// src/store/mod.rs
//! Content store: raw posts in, processed records out.
//!
//! The pipeline only ever talks to the [`ContentStore`] trait; `PgStore` is
//! the production Postgres implementation and `MemoryStore` backs the tests.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A tracked social-media account the collector follows.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub handle: String,
    pub active: bool,
}

/// A collected post about to be stored.
#[derive(Debug, Clone)]
pub struct NewRawPost {
    pub account_id: i64,
    pub external_id: String,
    pub author_handle: String,
    pub text: String,
    pub language: Option<String>,
    pub published_at: DateTime<Utc>,
    pub engagement: serde_json::Value,
}

/// A stored post, as handed to the batch processor.
#[derive(Debug, Clone)]
pub struct RawPost {
    pub id: i64,
    pub account_id: i64,
    pub external_id: String,
    pub author_handle: String,
    pub text: String,
    pub language: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// The annotation pipeline's output for one raw post.
#[derive(Debug, Clone)]
pub struct ProcessedPost {
    pub raw_post_id: i64,
    pub sentiment_score: f64,
    pub impact_score: f64,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub entities_mentioned: Vec<String>,
    pub summary: String,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Register accounts by handle; already-known handles are left alone.
    /// Returns how many were newly added.
    async fn seed_accounts(&self, handles: &[&str]) -> Result<usize>;

    async fn list_active_accounts(&self) -> Result<Vec<Account>>;

    /// Store a collected post unless `(account_id, external_id)` was seen
    /// before. Returns `true` when a row was actually written.
    async fn save_raw(&self, post: NewRawPost) -> Result<bool>;

    /// Up to `limit` posts with no processed record yet, oldest first.
    /// Language filter is permissive: `en`, `unknown`, or untagged.
    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<RawPost>>;

    /// Write one processed record in its own transaction; a second write for
    /// the same `raw_post_id` is a no-op.
    async fn persist_processed(&self, record: ProcessedPost) -> Result<()>;

    async fn processed_count(&self) -> Result<i64>;
}

pub type DynContentStore = Arc<dyn ContentStore>;

/// Public permalink for a post, used as the summary's source link.
pub fn post_url(handle: &str, external_id: &str) -> String {
    format!("https://twitter.com/{handle}/status/{external_id}")
}
