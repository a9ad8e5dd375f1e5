use std::fs;
use std::io;
use std::path::PathBuf;

use log::{debug, warn};

use crate::flow_analysis::types::FlowResult;

/// One unit of work handed to a chunk worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Position of the chunk in the input, starting at 0.
    pub index: usize,
    pub path: PathBuf,
    /// The file was produced by the splitting tool for this run and may be
    /// deleted once processed. The user's own input is never transient.
    pub transient: bool,
}

impl ChunkDescriptor {
    /// Deletes the chunk file when it is transient. Safe to call repeatedly.
    pub fn release(&self) {
        if !self.transient {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("[chunk {}] removed {}", self.index, self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[chunk {}] could not remove {}: {}",
                self.index,
                self.path.display(),
                e
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Completed,
    /// The worker could not produce results; the message says why.
    Failed(String),
}

/// What one chunk contributed to the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub index: usize,
    pub results: Vec<FlowResult>,
    pub status: ChunkStatus,
}

impl ChunkOutcome {
    pub fn failed(index: usize, reason: String) -> Self {
        Self {
            index,
            results: Vec::new(),
            status: ChunkStatus::Failed(reason),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ChunkStatus::Failed(_))
    }
}
