//! In-memory registry of bulk processing batches.

use crate::services::metrics::BULK_BATCHES;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Processing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub report_name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    pub fn success(report_name: impl Into<String>, report_id: i64) -> Self {
        Self {
            report_name: report_name.into(),
            status: ItemStatus::Success,
            report_id: Some(report_id),
            error: None,
        }
    }

    pub fn failed(report_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            report_name: report_name.into(),
            status: ItemStatus::Failed,
            report_id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStatus {
    pub status: BatchState,
    pub total: usize,
    pub processed: usize,
    pub results: Vec<BatchItemResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shared batch status map. Completed batches expire `ttl` after their last
/// update; batches still processing are never evicted.
#[derive(Clone)]
pub struct BatchRegistry {
    batches: Arc<DashMap<String, BatchStatus>>,
    ttl: Duration,
}

impl BatchRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            batches: Arc::new(DashMap::new()),
            ttl,
        }
    }

    fn new_batch_id(total: usize) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("batch_{}_{}_{}", Utc::now().timestamp(), total, &suffix[..8])
    }

    /// Registers a new batch of `total` reports and returns its id.
    pub fn create(&self, total: usize) -> String {
        let now = Utc::now();
        self.evict_expired(now);

        let batch_id = Self::new_batch_id(total);
        self.batches.insert(
            batch_id.clone(),
            BatchStatus {
                status: BatchState::Processing,
                total,
                processed: 0,
                results: Vec::with_capacity(total),
                created_at: now,
                updated_at: now,
            },
        );
        BULK_BATCHES.set(self.batches.len() as i64);

        info!(batch_id = %batch_id, total, "Bulk batch registered");
        batch_id
    }

    pub fn record_result(&self, batch_id: &str, result: BatchItemResult) {
        if let Some(mut batch) = self.batches.get_mut(batch_id) {
            batch.processed += 1;
            batch.results.push(result);
            batch.updated_at = Utc::now();
        }
    }

    pub fn complete(&self, batch_id: &str) {
        if let Some(mut batch) = self.batches.get_mut(batch_id) {
            batch.status = BatchState::Completed;
            batch.updated_at = Utc::now();
            info!(
                batch_id = %batch_id,
                processed = batch.processed,
                total = batch.total,
                "Bulk batch completed"
            );
        }
    }

    pub fn get(&self, batch_id: &str) -> Option<BatchStatus> {
        self.batches.get(batch_id).map(|b| b.clone())
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Drops completed batches last updated more than `ttl` before `now`.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let before = self.batches.len();
        self.batches.retain(|_, batch| {
            batch.status == BatchState::Processing
                || now.signed_duration_since(batch.updated_at) <= ttl
        });
        let evicted = before.saturating_sub(self.batches.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired bulk batches");
        }
        BULK_BATCHES.set(self.batches.len() as i64);
        evicted
    }

    /// Periodically evicts expired batches for the life of the process.
    /// Intervals below one second are raised to one second.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let every = every.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.evict_expired(Utc::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_carry_count_and_suffix() {
        let registry = BatchRegistry::new(Duration::from_secs(60));
        let id = registry.create(3);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts[0], "batch");
        assert_eq!(parts[2], "3");
        assert_eq!(parts[3].len(), 8);
    }

    #[test]
    fn status_moves_from_processing_to_completed() {
        let registry = BatchRegistry::new(Duration::from_secs(60));
        let id = registry.create(2);

        let status = registry.get(&id).unwrap();
        assert_eq!(status.status, BatchState::Processing);
        assert_eq!(status.processed, 0);

        registry.record_result(&id, BatchItemResult::success("Report_1", 10));
        registry.record_result(&id, BatchItemResult::failed("Report_2", "No data found"));
        registry.complete(&id);

        let status = registry.get(&id).unwrap();
        assert_eq!(status.status, BatchState::Completed);
        assert_eq!(status.processed, 2);
        assert_eq!(status.results[0].report_id, Some(10));
        assert_eq!(status.results[1].status, ItemStatus::Failed);
    }

    #[test]
    fn unknown_batch_is_none() {
        let registry = BatchRegistry::new(Duration::from_secs(60));
        assert!(registry.get("batch_0_0_deadbeef").is_none());
        registry.record_result("batch_0_0_deadbeef", BatchItemResult::success("x", 1));
        assert!(registry.is_empty());
    }

    #[test]
    fn only_expired_completed_batches_are_evicted() {
        let registry = BatchRegistry::new(Duration::from_secs(60));
        let done = registry.create(1);
        let running = registry.create(1);
        registry.complete(&done);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(registry.evict_expired(later), 1);
        assert!(registry.get(&done).is_none());
        assert!(registry.get(&running).is_some());
    }

    #[test]
    fn fresh_completed_batches_survive_eviction() {
        let registry = BatchRegistry::new(Duration::from_secs(60));
        let id = registry.create(1);
        registry.complete(&id);
        assert_eq!(registry.evict_expired(Utc::now()), 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn zero_sweep_interval_keeps_sweeper_running() {
        let registry = BatchRegistry::new(Duration::from_secs(60));
        let handle = registry.spawn_sweeper(Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[test]
    fn status_serializes_lowercase() {
        let registry = BatchRegistry::new(Duration::from_secs(60));
        let id = registry.create(1);
        registry.record_result(&id, BatchItemResult::success("Report_9", 4));
        let json = serde_json::to_value(registry.get(&id).unwrap()).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["results"][0]["status"], "success");
        assert!(json["results"][0].get("error").is_none());
    }
}
