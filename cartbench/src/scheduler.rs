//! Fan-out of a fixed number of units with a concurrency limit.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Runs `unit(i)` for every `i` in `0..n`, with at most `concurrency` units in flight.
///
/// Each unit runs as its own task on the tokio runtime. This function returns once every started
/// unit has completed, which makes it a barrier between phases. Once `cancel` fires, no further
/// units are started. Units that are already running are not aborted; they are expected to observe
/// `cancel` themselves.
///
/// A `concurrency` of zero is treated as one. Returns the number of units that were started.
pub async fn run_bounded<F, Fut>(
    n: usize,
    concurrency: usize,
    cancel: &CancellationToken,
    unit: F,
) -> usize
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let concurrency = concurrency.clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize));
    let semaphore = Arc::new(Semaphore::new(concurrency));

    let mut started = 0;
    for index in 0..n {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => permit,
        };
        let Ok(permit) = permit else {
            break;
        };

        let task = unit(index);
        tokio::spawn(async move {
            task.await;
            drop(permit);
        });
        started += 1;
    }

    if started < n {
        tracing::debug!(started, n, "deadline reached before all units were started");
    }

    // by acquiring *all* the permits, we essentially wait for all outstanding units to finish
    let _permits = semaphore.acquire_many(concurrency as u32).await;

    started
}
