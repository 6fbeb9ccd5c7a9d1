// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Scan progress, as consulted before admitting a new scan-all job.

use crate::models::ScanStats;
use crate::store::{ScanTaskStore, Store, StoreResult};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ScanController: Send + Sync {
    /// Progress of the per-image scans started under `track_id`.
    async fn get_stats(&self, track_id: &str) -> StoreResult<ScanStats>;
}

pub struct StoreScanController {
    store: Arc<dyn Store>,
}

impl StoreScanController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ScanController for StoreScanController {
    async fn get_stats(&self, track_id: &str) -> StoreResult<ScanStats> {
        self.store.scan_stats(track_id).await
    }
}

impl ScanStats {
    /// Completed share rounded to a whole percent; 0 when nothing was scheduled.
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 * 100.0) / self.total as f64).round() as u64
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn percent_rounds_and_handles_empty() {
        assert_eq!(ScanStats { total: 100, completed: 40 }.percent(), 40);
        assert_eq!(ScanStats { total: 3, completed: 2 }.percent(), 67);
        assert_eq!(ScanStats { total: 0, completed: 0 }.percent(), 0);
        assert!(ScanStats::default().is_done());
    }

    #[tokio::test]
    async fn stats_come_from_the_store() {
        let store = Arc::new(MemoryStore::new());
        store.set_scan_stats("7", ScanStats { total: 10, completed: 4 });
        let scans = StoreScanController::new(store);
        let stats = scans.get_stats("7").await.unwrap();
        assert_eq!(stats.completed, 4);
        assert!(!stats.is_done());
    }
}
