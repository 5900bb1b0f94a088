//! API key pool with cooldown-aware rotation.
//!
//! OpenRouter free-tier keys rate-limit aggressively; the pipeline spreads
//! load over a cyclic pool of equivalent keys and parks a key for a cooldown
//! window whenever the backend signals 429.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DEFAULT_COOLDOWN_SECS: u64 = 60;
const ENV_KEY_PREFIX: &str = "OPENROUTER_API_KEY";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("keys_rotations_total", "Key rotations performed.");
        describe_counter!(
            "keys_rate_limited_total",
            "Keys marked cooling after a 429 signal."
        );
        describe_counter!(
            "keys_pool_exhausted_total",
            "Rotations where every key in the pool was cooling."
        );
    });
}

/// Why a caller is asking for the next key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateReason {
    /// The backend rate-limited the current key; park it before advancing.
    RateLimited,
    /// Any other failure; just move on to the next key.
    Failover,
}

#[derive(Debug)]
struct KeyState {
    token: String,
    cooldown_until: Option<Instant>,
}

impl KeyState {
    fn is_cooling(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|t| t > now)
    }
}

#[derive(Debug)]
struct PoolState {
    keys: Vec<KeyState>,
    cursor: usize,
}

/// Cyclic pool of interchangeable bearer keys.
///
/// Shared by every in-flight request, so all state lives behind one `Mutex`;
/// lock sections are short and never await.
pub struct ApiKeyPool {
    cooldown: Duration,
    state: Mutex<PoolState>,
}

impl ApiKeyPool {
    /// Load keys from `OPENROUTER_API_KEY`, then `OPENROUTER_API_KEY_1`,
    /// `OPENROUTER_API_KEY_2`, ... until the first gap.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_cooldown(Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }

    pub fn from_env_with_cooldown(cooldown: Duration) -> Result<Self> {
        let mut keys = Vec::new();
        if let Ok(k) = std::env::var(ENV_KEY_PREFIX) {
            if !k.trim().is_empty() {
                keys.push(k);
            }
        }
        let mut i = 1u32;
        while let Ok(k) = std::env::var(format!("{ENV_KEY_PREFIX}_{i}")) {
            if k.trim().is_empty() {
                break;
            }
            keys.push(k);
            i += 1;
        }
        Self::from_keys(keys, cooldown)
    }

    pub fn from_keys(keys: Vec<String>, cooldown: Duration) -> Result<Self> {
        ensure_metrics_described();
        if keys.is_empty() {
            bail!("at least one API key is required (set {ENV_KEY_PREFIX})");
        }
        info!(count = keys.len(), "API key pool initialized");
        let keys = keys
            .into_iter()
            .map(|token| KeyState {
                token,
                cooldown_until: None,
            })
            .collect();
        Ok(Self {
            cooldown,
            state: Mutex::new(PoolState { keys, cursor: 0 }),
        })
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("key pool mutex poisoned").keys.len()
    }

    /// Retry budget for one logical request: twice around the pool, capped.
    pub fn max_attempts(&self) -> usize {
        (self.len() * 2).min(10)
    }

    /// The currently active key. If it is cooling down, advances first.
    pub fn current(&self) -> String {
        let mut st = self.state.lock().expect("key pool mutex poisoned");
        let now = Instant::now();
        if st.keys[st.cursor].is_cooling(now) {
            debug!("current key is cooling down, rotating");
            Self::advance(&mut st, now);
        }
        st.keys[st.cursor].token.clone()
    }

    /// Advance to the next usable key.
    ///
    /// `RateLimited` parks the pre-rotation key for the cooldown window. A
    /// pool of one has nowhere to go: its cooldown is cleared instead, which
    /// accepts the risk of reusing a still-limited key over deadlocking.
    pub fn rotate(&self, reason: RotateReason) {
        let mut st = self.state.lock().expect("key pool mutex poisoned");
        let now = Instant::now();

        if reason == RotateReason::RateLimited {
            let cursor = st.cursor;
            st.keys[cursor].cooldown_until = Some(now + self.cooldown);
            counter!("keys_rate_limited_total").increment(1);
            warn!(
                cooldown_secs = self.cooldown.as_secs(),
                "key rate limited, cooling down"
            );
        }

        if st.keys.len() == 1 {
            if st.keys[0].cooldown_until.take().is_some() {
                warn!("only one API key available, clearing its cooldown");
            }
            return;
        }

        Self::advance(&mut st, now);
    }

    /// Park a specific key (matched by token) for the cooldown window.
    pub fn mark_rate_limited(&self, token: &str) {
        let mut st = self.state.lock().expect("key pool mutex poisoned");
        let until = Instant::now() + self.cooldown;
        if let Some(k) = st.keys.iter_mut().find(|k| k.token == token) {
            k.cooldown_until = Some(until);
            counter!("keys_rate_limited_total").increment(1);
        }
    }

    // Bounded scan: at most one full cycle. If every key is cooling, settle
    // on the one whose cooldown expires soonest and leave its stamp intact.
    fn advance(st: &mut PoolState, now: Instant) {
        counter!("keys_rotations_total").increment(1);
        let len = st.keys.len();
        for hop in 1..=len {
            let idx = (st.cursor + hop) % len;
            if !st.keys[idx].is_cooling(now) {
                st.keys[idx].cooldown_until = None; // drop an expired stamp
                st.cursor = idx;
                return;
            }
        }

        counter!("keys_pool_exhausted_total").increment(1);
        let soonest = st
            .keys
            .iter()
            .enumerate()
            .min_by_key(|(_, k)| k.cooldown_until)
            .map(|(i, _)| i)
            .unwrap_or(st.cursor);
        warn!("entire key pool is cooling down, using soonest-to-expire key");
        st.cursor = soonest;
    }
}
