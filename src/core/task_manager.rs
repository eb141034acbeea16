use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Spawn a blocking task
pub fn spawn_blocking_task<F, R>(func: F) -> tokio::task::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(func)
}

/// Run a blocking closure once a permit of `limit` is free.
///
/// The permit is held for as long as the closure runs. A closure that panics
/// or is cancelled surfaces as an error instead of tearing down the caller.
pub async fn run_bounded_blocking<F, R>(limit: Arc<Semaphore>, func: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let permit = limit
        .acquire_owned()
        .await
        .map_err(|err| anyhow!("Worker pool closed: {err}"))?;

    spawn_blocking_task(move || {
        let _permit = permit;
        func()
    })
    .await
    .map_err(|err| anyhow!("Worker task failed: {err}"))
}
