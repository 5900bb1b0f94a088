// src/config/mod.rs
pub mod ai;

use anyhow::{Context, Result};

/// Process-level settings, sourced from the environment (`.env` is loaded by
/// the binary before this runs).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub admin_addr: String,
    pub collect_interval_secs: u64,
    pub process_interval_secs: u64,
    pub process_batch_limit: i64,
    pub nitter_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        Ok(Self {
            database_url,
            admin_addr: env_or("ADMIN_ADDR", "0.0.0.0:8080"),
            collect_interval_secs: env_u64("COLLECT_INTERVAL_SECS", 300),
            process_interval_secs: env_u64("PROCESS_INTERVAL_SECS", 600),
            process_batch_limit: env_u64("PROCESS_BATCH_LIMIT", 100) as i64,
            nitter_base_url: env_or("NITTER_BASE_URL", "https://nitter.net"),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
