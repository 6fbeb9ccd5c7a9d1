// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Bounded parallel assembly of list items.
//!
//! Each item is tagged with its input index before it is handed to a task;
//! results are re-sorted by that index on drain, so the output order never
//! depends on which task finished first.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Default number of per-item lookups running at once.
pub const DEFAULT_PARALLELISM: usize = 8;

pub async fn assemble_ordered<I, T, F, Fut>(
    items: Vec<I>,
    parallelism: usize,
    build: F,
) -> Result<Vec<T>, JoinError>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let permits = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut joins = JoinSet::new();
    for (idx, item) in items.into_iter().enumerate() {
        let permits = permits.clone();
        let work = build(item);
        joins.spawn(async move {
            // the semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            (idx, work.await)
        });
    }

    let mut done = Vec::with_capacity(joins.len());
    while let Some(result) = joins.join_next().await {
        done.push(result?);
    }
    done.sort_by_key(|(idx, _)| *idx);
    Ok(done.into_iter().map(|(_, item)| item).collect())
}
