//! history.rs — in-memory log of recently processed posts for diagnostics.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryEntry {
    pub ts_unix: u64,
    pub raw_post_id: i64,
    pub sentiment_score: f64,
    pub summary: String,
}

#[derive(Debug)]
pub struct History {
    inner: Mutex<Vec<HistoryEntry>>,
    cap: usize,
}

impl History {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap: cap.min(10_000),
        }
    }

    pub fn push(&self, raw_post_id: i64, sentiment_score: f64, summary: &str) {
        let entry = HistoryEntry {
            ts_unix: now_unix(),
            raw_post_id,
            sentiment_score,
            summary: summary.to_string(),
        };

        let mut v = self.inner.lock().expect("history mutex poisoned");
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<HistoryEntry> {
        let v = self.inner.lock().expect("history mutex poisoned");
        let len = v.len();
        let start = len.saturating_sub(n);
        v[start..].to_vec()
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_is_capacity_bounded() {
        let h = History::with_capacity(3);
        for i in 0..5 {
            h.push(i, 0.0, "s");
        }
        let snap = h.snapshot_last_n(10);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].raw_post_id, 2);
        assert_eq!(snap[2].raw_post_id, 4);
    }
}
