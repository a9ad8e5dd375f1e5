//! Chunk workers.
//!
//! A worker turns one chunk into the final records of its flows. The
//! subprocess worker gives every chunk its own process, so a crash in the
//! dissector glue or the image codecs only costs that chunk. Results travel
//! back as JSON lines on the child's stdout, one [`FlowResult`] per line.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use log::{debug, info, warn};

use super::types::ChunkDescriptor;
use crate::error_handling::types::WorkerError;
use crate::flow_analysis::correlator::correlate_flow;
use crate::flow_analysis::dissector::{Dissector, TsharkDissector};
use crate::flow_analysis::extractor::extract_flows;
use crate::flow_analysis::types::FlowResult;

/// Runs the analysis of one chunk. Implementations block.
pub trait ChunkWorker: Send + Sync {
    fn run(&self, run_id: &str, chunk: &ChunkDescriptor) -> Result<Vec<FlowResult>, WorkerError>;
}

/// Extracts, correlates and releases one chunk.
///
/// Flows are correlated one after the other. The chunk is released even when
/// the dissector produced nothing.
pub fn process_chunk(
    dissector: &dyn Dissector,
    chunk: &ChunkDescriptor,
    image_dir: &Path,
) -> Vec<FlowResult> {
    let results: Vec<FlowResult> = match extract_flows(dissector, &chunk.path) {
        Some(flows) => flows
            .iter()
            .map(|(key, requests)| correlate_flow(*key, requests, image_dir))
            .collect(),
        None => Vec::new(),
    };
    chunk.release();
    debug!("[chunk {}] {} flow(s) correlated", chunk.index, results.len());
    results
}

/// Runs chunks on the calling thread.
pub struct InProcessWorker {
    dissector: Arc<dyn Dissector>,
    image_dir: PathBuf,
}

impl InProcessWorker {
    pub fn new(dissector: Arc<dyn Dissector>, image_dir: PathBuf) -> Self {
        Self {
            dissector,
            image_dir,
        }
    }
}

impl ChunkWorker for InProcessWorker {
    fn run(&self, run_id: &str, chunk: &ChunkDescriptor) -> Result<Vec<FlowResult>, WorkerError> {
        debug!("[{}] chunk {} in process", run_id, chunk.index);
        Ok(process_chunk(self.dissector.as_ref(), chunk, &self.image_dir))
    }
}

/// Runs every chunk in a child process executing the hidden `worker`
/// subcommand of `executable`.
#[derive(Debug, Clone)]
pub struct SubprocessWorker {
    executable: PathBuf,
    tshark: PathBuf,
    image_dir: PathBuf,
}

impl SubprocessWorker {
    pub fn new(executable: PathBuf, tshark: PathBuf, image_dir: PathBuf) -> Self {
        Self {
            executable,
            tshark,
            image_dir,
        }
    }

    /// Worker re-executing the running binary.
    pub fn current(tshark: PathBuf, image_dir: PathBuf) -> Result<Self, WorkerError> {
        let executable = std::env::current_exe()?;
        Ok(Self::new(executable, tshark, image_dir))
    }

    fn command(&self, run_id: &str, chunk: &ChunkDescriptor) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("worker")
            .args(["--run-id", run_id])
            .arg("--chunk")
            .arg(&chunk.path)
            .arg("--index")
            .arg(chunk.index.to_string())
            .arg("--tshark")
            .arg(&self.tshark)
            .arg("--image-dir")
            .arg(&self.image_dir);
        if chunk.transient {
            cmd.arg("--transient");
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl ChunkWorker for SubprocessWorker {
    fn run(&self, run_id: &str, chunk: &ChunkDescriptor) -> Result<Vec<FlowResult>, WorkerError> {
        let output = self.command(run_id, chunk).output()?;
        if !output.status.success() {
            return Err(WorkerError::Crashed(format!(
                "chunk {} worker exited with {}",
                chunk.index, output.status
            )));
        }
        Ok(parse_worker_output(chunk.index, &output.stdout))
    }
}

/// Writes results as JSON lines.
pub fn emit_results<W: Write>(mut out: W, results: &[FlowResult]) -> io::Result<()> {
    for result in results {
        serde_json::to_writer(&mut out, result)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

/// Reads the JSON lines written by a worker. Blank and unparsable lines are
/// skipped.
pub fn parse_worker_output(index: usize, stdout: &[u8]) -> Vec<FlowResult> {
    let mut results = Vec::new();
    for (number, line) in stdout.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("[chunk {}] unreadable worker line {}: {}", index, number + 1, e);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FlowResult>(&line) {
            Ok(result) => results.push(result),
            Err(e) => warn!(
                "[chunk {}] skipping worker line {}: {}",
                index,
                number + 1,
                e
            ),
        }
    }
    results
}

/// Body of the `worker` subcommand: analyze one chunk with `tshark` and stream
/// the results to `out`. Returns how many results were written.
pub fn serve_chunk<W: Write>(
    run_id: &str,
    chunk: &ChunkDescriptor,
    tshark: &Path,
    image_dir: &Path,
    out: W,
) -> io::Result<usize> {
    info!("[{}] worker started on chunk {}", run_id, chunk.index);
    let dissector = TsharkDissector::new(tshark);
    let results = process_chunk(&dissector, chunk, image_dir);
    emit_results(out, &results)?;
    Ok(results.len())
}
