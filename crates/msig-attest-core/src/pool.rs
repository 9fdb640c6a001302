//! Bounded, order-preserving worker pool
//!
//! Per-address work (key derivation, signing, verification) is CPU-bound and
//! independent, so it runs on tokio's blocking pool. At most `workers` tasks
//! are in flight; results come back in input order.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker task failed: {0}")]
    Join(#[from] JoinError),
}

/// Apply `f` to every item on the blocking pool, yielding results in input order.
///
/// `workers == 0` is treated as 1.
pub async fn map_ordered<I, T, R, F>(items: I, workers: usize, f: F) -> Result<Vec<R>, PoolError>
where
    I: IntoIterator<Item = T>,
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let f = Arc::new(f);
    stream::iter(items.into_iter().map(move |item| {
        let f = Arc::clone(&f);
        tokio::task::spawn_blocking(move || f(item))
    }))
    .buffered(workers.max(1))
    .map_err(PoolError::from)
    .try_collect()
    .await
}
