//! End to end analysis of one capture file.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use log::{error, info, warn};
use uuid::Uuid;

use crate::chunk_dispatch::dispatcher::{available_cpus, dispatch, pool_size};
use crate::chunk_dispatch::splitter::plan_chunks;
use crate::chunk_dispatch::worker::ChunkWorker;
use crate::configuration::types::Config;
use crate::error_handling::types::PipelineError;
use crate::report::ReportAssembler;

/// What a finished run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub chunks: usize,
    pub failed_chunks: usize,
    /// Distinct flows in the report.
    pub flows: usize,
    pub report_path: PathBuf,
    pub elapsed: TimeDelta,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} flow(s) from {} chunk(s) ({} failed) in {:.1}s, report at {}",
            self.flows,
            self.chunks,
            self.failed_chunks,
            self.elapsed.num_milliseconds() as f64 / 1000.0,
            self.report_path.display()
        )
    }
}

/// Analyzes `input` with `worker` and writes the report configured in
/// `config`.
///
/// Failed chunks are counted, not fatal. Splitting and report failures are.
pub async fn run_analysis(
    config: &Config,
    input: &Path,
    worker: Arc<dyn ChunkWorker>,
) -> Result<RunSummary, PipelineError> {
    let started = Utc::now();
    let run_id = Uuid::new_v4();
    let tag = run_id.to_string();
    info!("[{}] Analyzing {}", tag, input.display());

    fs::create_dir_all(&config.image_dir).map_err(|e| {
        error!(
            "[{}] Cannot create image directory {}: {}",
            tag,
            config.image_dir.display(),
            e
        );
        e
    })?;

    let plan = {
        let config = config.clone();
        let input = input.to_path_buf();
        tokio::task::spawn_blocking(move || plan_chunks(&input, &config))
            .await
            .map_err(|e| PipelineError::IoError(io::Error::other(e.to_string())))??
    };

    let total = plan.chunks.len();
    let pool = pool_size(available_cpus(), config);
    let mut outcomes = dispatch(&tag, plan.chunks.clone(), worker, pool);

    let mut assembler = ReportAssembler::new();
    let mut done = 0usize;
    let mut failed_chunks = 0usize;
    while let Some(outcome) = outcomes.recv().await {
        done += 1;
        if outcome.is_failed() {
            failed_chunks += 1;
            warn!(
                "[{}] chunk {}/{} (#{}) failed, no results",
                tag, done, total, outcome.index
            );
        } else {
            info!(
                "[{}] chunk {}/{} (#{}) done, {} flow(s)",
                tag,
                done,
                total,
                outcome.index,
                outcome.results.len()
            );
        }
        assembler.absorb_all(outcome.results);
    }

    plan.cleanup();

    let flows = assembler.write_csv(&config.report_path).map_err(|e| {
        error!("[{}] Cannot write report: {}", tag, e);
        e
    })?;

    let summary = RunSummary {
        run_id,
        chunks: total,
        failed_chunks,
        flows,
        report_path: config.report_path.clone(),
        elapsed: Utc::now() - started,
    };
    info!("[{}] {}", tag, summary);
    Ok(summary)
}
