// tests/collect_rss.rs
// Feed parsing plus the collect loop's dedup behavior over the memory store.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crypto_pulse::collect::nitter::NitterRssSource;
use crypto_pulse::collect::{run_once, CollectedPost, PostSource};
use crypto_pulse::store::memory::MemoryStore;
use crypto_pulse::store::{Account, ContentStore};

const FIXTURE: &str = include_str!("fixtures/nitter_rss.xml");

#[test]
fn fixture_feed_parses_posts_with_ids_and_dates() {
    let posts = NitterRssSource::parse_feed(FIXTURE).unwrap();
    // The empty-text item is dropped.
    assert_eq!(posts.len(), 2);

    assert_eq!(posts[0].external_id, "1929611111111111111");
    assert_eq!(posts[0].text, "There is no second best. #Bitcoin");
    assert_eq!(
        posts[0].published_at,
        Utc.with_ymd_and_hms(2025, 6, 2, 14, 10, 0).unwrap()
    );

    // Entities scrubbed before the XML parser saw them
    assert!(posts[1].text.contains("$800M - average price"));
}

struct FixtureSource;

#[async_trait]
impl PostSource for FixtureSource {
    async fn fetch_latest(&self, _account: &Account) -> anyhow::Result<Vec<CollectedPost>> {
        NitterRssSource::parse_feed(FIXTURE)
    }
    fn name(&self) -> &'static str {
        "fixture"
    }
}

#[tokio::test]
async fn collect_saves_once_and_dedups_on_rerun() {
    let store = MemoryStore::new();
    store.seed_accounts(&["saylor"]).await.unwrap();

    let saved = run_once(&FixtureSource, &store).await;
    assert_eq!(saved, 2);

    // Same feed again: everything is a duplicate.
    let saved_again = run_once(&FixtureSource, &store).await;
    assert_eq!(saved_again, 0);

    let unprocessed = store.fetch_unprocessed(10).await.unwrap();
    assert_eq!(unprocessed.len(), 2);
    assert_eq!(unprocessed[0].author_handle, "saylor");
    // Oldest first
    assert!(unprocessed[0].published_at < unprocessed[1].published_at);
}

struct BrokenSource;

#[async_trait]
impl PostSource for BrokenSource {
    async fn fetch_latest(&self, _account: &Account) -> anyhow::Result<Vec<CollectedPost>> {
        anyhow::bail!("feed unreachable")
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn source_errors_do_not_abort_collection() {
    let store = MemoryStore::new();
    store.seed_accounts(&["saylor", "coinbase"]).await.unwrap();
    assert_eq!(run_once(&BrokenSource, &store).await, 0);
}
