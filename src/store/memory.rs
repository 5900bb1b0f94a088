// src/store/memory.rs
//! In-memory [`ContentStore`] used by tests; mirrors the Postgres contracts
//! (dedup keys, language filter, idempotent processed writes).

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{Account, ContentStore, NewRawPost, ProcessedPost, RawPost};

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    raws: Vec<RawPost>,
    processed: Vec<ProcessedPost>,
    next_account_id: i64,
    next_raw_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: the processed records written so far, in write order.
    pub fn processed_snapshot(&self) -> Vec<ProcessedPost> {
        self.inner
            .lock()
            .expect("memory store mutex poisoned")
            .processed
            .clone()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn seed_accounts(&self, handles: &[&str]) -> Result<usize> {
        let mut st = self.inner.lock().expect("memory store mutex poisoned");
        let mut added = 0;
        for handle in handles {
            if st.accounts.iter().any(|a| a.handle == *handle) {
                continue;
            }
            st.next_account_id += 1;
            let id = st.next_account_id;
            st.accounts.push(Account {
                id,
                handle: handle.to_string(),
                active: true,
            });
            added += 1;
        }
        Ok(added)
    }

    async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        let st = self.inner.lock().expect("memory store mutex poisoned");
        Ok(st.accounts.iter().filter(|a| a.active).cloned().collect())
    }

    async fn save_raw(&self, post: NewRawPost) -> Result<bool> {
        let mut st = self.inner.lock().expect("memory store mutex poisoned");
        let dup = st
            .raws
            .iter()
            .any(|r| r.account_id == post.account_id && r.external_id == post.external_id);
        if dup {
            return Ok(false);
        }
        st.next_raw_id += 1;
        let id = st.next_raw_id;
        st.raws.push(RawPost {
            id,
            account_id: post.account_id,
            external_id: post.external_id,
            author_handle: post.author_handle,
            text: post.text,
            language: post.language,
            published_at: post.published_at,
        });
        Ok(true)
    }

    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<RawPost>> {
        let st = self.inner.lock().expect("memory store mutex poisoned");
        let mut out: Vec<RawPost> = st
            .raws
            .iter()
            .filter(|r| !st.processed.iter().any(|p| p.raw_post_id == r.id))
            .filter(|r| {
                matches!(r.language.as_deref(), Some("en") | Some("unknown") | None)
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| r.published_at);
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn persist_processed(&self, record: ProcessedPost) -> Result<()> {
        let mut st = self.inner.lock().expect("memory store mutex poisoned");
        if st
            .processed
            .iter()
            .any(|p| p.raw_post_id == record.raw_post_id)
        {
            return Ok(()); // idempotent, like ON CONFLICT DO NOTHING
        }
        st.processed.push(record);
        Ok(())
    }

    async fn processed_count(&self) -> Result<i64> {
        let st = self.inner.lock().expect("memory store mutex poisoned");
        Ok(st.processed.len() as i64)
    }
}
