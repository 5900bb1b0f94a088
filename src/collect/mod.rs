// src/collect/mod.rs
pub mod nitter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::store::{Account, ContentStore, NewRawPost};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_posts_total", "Posts parsed from source feeds.");
        describe_counter!("collect_saved_total", "New posts written to the store.");
        describe_counter!(
            "collect_source_errors_total",
            "Source fetch/parse errors (per account)."
        );
    });
}

/// One post as fetched from a source, before storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedPost {
    pub external_id: String,
    pub text: String,
    pub language: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_latest(&self, account: &Account) -> anyhow::Result<Vec<CollectedPost>>;
    fn name(&self) -> &'static str;
}

/// Normalize post text: decode HTML entities, strip tags, normalize curly
/// quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Collect once from `source` for every active account. Per-account errors
/// are logged and skipped; dedup happens in the store (by external id).
/// Returns the number of newly saved posts.
pub async fn run_once(source: &dyn PostSource, store: &dyn ContentStore) -> usize {
    ensure_metrics_described();

    let accounts = match store.list_active_accounts().await {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = ?e, "failed to list accounts");
            return 0;
        }
    };
    tracing::info!(count = accounts.len(), source = source.name(), "collecting accounts");

    let mut saved = 0usize;
    for account in &accounts {
        let posts = match source.fetch_latest(account).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = ?e, handle = %account.handle, "source error");
                counter!("collect_source_errors_total").increment(1);
                continue;
            }
        };
        counter!("collect_posts_total").increment(posts.len() as u64);

        for post in posts {
            if post.text.is_empty() {
                continue;
            }
            let new_post = NewRawPost {
                account_id: account.id,
                external_id: post.external_id,
                author_handle: account.handle.clone(),
                text: post.text,
                language: post.language,
                published_at: post.published_at,
                engagement: serde_json::json!({}),
            };
            match store.save_raw(new_post).await {
                Ok(true) => saved += 1,
                Ok(false) => {} // already collected
                Err(e) => {
                    tracing::warn!(error = ?e, handle = %account.handle, "failed to save post");
                }
            }
        }
    }

    counter!("collect_saved_total").increment(saved as u64);
    tracing::info!(saved, "collection finished");
    saved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_decodes_strips_and_collapses() {
        let s = "<p>Hello&nbsp;&nbsp;world &ldquo;ok&rdquo;</p>";
        assert_eq!(normalize_text(s), r#"Hello world "ok""#);
    }

    #[test]
    fn normalize_caps_length() {
        let long = "x".repeat(2000);
        assert_eq!(normalize_text(&long).chars().count(), 1500);
    }
}
