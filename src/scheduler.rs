// src/scheduler.rs
//! Background loops: collection and processing tick independently so a slow
//! annotation batch never starves the collector.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;

use crate::collect::{self, PostSource};
use crate::process::BatchProcessor;
use crate::store::DynContentStore;

pub fn spawn_collect_loop(
    interval_secs: u64,
    source: Arc<dyn PostSource>,
    store: DynContentStore,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let saved = collect::run_once(source.as_ref(), store.as_ref()).await;
            counter!("collect_runs_total").increment(1);
            tracing::info!(target: "collect", saved, "collect tick");
        }
    })
}

pub fn spawn_process_loop(
    interval_secs: u64,
    batch_limit: i64,
    processor: Arc<BatchProcessor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let persisted = processor.run(batch_limit).await;
            counter!("process_ticks_total").increment(1);
            tracing::info!(target: "process", persisted, "process tick");
        }
    })
}
