use std::any::Any;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, Semaphore};

use super::types::{ChunkDescriptor, ChunkOutcome, ChunkStatus};
use super::worker::ChunkWorker;
use crate::configuration::types::Config;
use crate::error_handling::types::WorkerError;

/// Number of CPUs the scheduler reports, at least 1.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Worker pool size for `cpus` available CPUs.
///
/// `max(min_workers, floor(cpus * worker_fraction))`, capped by `max_workers`
/// and never below 1. The number of chunks is not taken into account.
pub fn pool_size(cpus: usize, config: &Config) -> usize {
    let share = (cpus as f64 * config.worker_fraction).floor() as usize;
    let mut size = share.max(config.min_workers);
    if let Some(max) = config.max_workers {
        size = size.min(max);
    }
    size.max(1)
}

/// Starts one task per chunk, at most `pool` running at once, and returns the
/// channel their outcomes arrive on, in completion order.
///
/// The channel closes once every chunk has reported. A worker error or panic
/// becomes a failed outcome with no results. Each chunk is released after its
/// worker returns, whatever the outcome. Must be called inside a tokio
/// runtime.
pub fn dispatch(
    run_id: &str,
    chunks: Vec<ChunkDescriptor>,
    worker: Arc<dyn ChunkWorker>,
    pool: usize,
) -> mpsc::Receiver<ChunkOutcome> {
    let (tx, rx) = mpsc::channel(chunks.len().max(1));
    let semaphore = Arc::new(Semaphore::new(pool.max(1)));
    info!(
        "[{}] Dispatching {} chunk(s) on {} worker(s)",
        run_id,
        chunks.len(),
        pool.max(1)
    );

    for chunk in chunks {
        let tx = tx.clone();
        let semaphore = semaphore.clone();
        let worker = worker.clone();
        let run_id = run_id.to_string();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            debug!("[{}] chunk {} started", run_id, chunk.index);

            let job = chunk.clone();
            let job_run_id = run_id.clone();
            let joined = tokio::task::spawn_blocking(move || worker.run(&job_run_id, &job)).await;
            chunk.release();

            let outcome = match joined {
                Ok(Ok(results)) => ChunkOutcome {
                    index: chunk.index,
                    results,
                    status: ChunkStatus::Completed,
                },
                Ok(Err(e)) => {
                    warn!("[{}] chunk {} failed: {}", run_id, chunk.index, e);
                    ChunkOutcome::failed(chunk.index, e.to_string())
                }
                Err(join_error) => {
                    let e = if join_error.is_panic() {
                        WorkerError::Panicked(panic_message(join_error.into_panic()))
                    } else {
                        WorkerError::Crashed("worker task cancelled".to_string())
                    };
                    warn!("[{}] chunk {} failed: {}", run_id, chunk.index, e);
                    ChunkOutcome::failed(chunk.index, e.to_string())
                }
            };

            if tx.send(outcome).await.is_err() {
                debug!("[{}] result receiver dropped", run_id);
            }
        });
    }

    rx
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
