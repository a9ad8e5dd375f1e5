//! Splitting of large captures and parallel chunk processing.

pub mod dispatcher;
pub mod splitter;
pub mod types;
pub mod worker;

pub use dispatcher::{available_cpus, dispatch, pool_size};
pub use splitter::{plan_chunks, ChunkPlan};
pub use types::{ChunkDescriptor, ChunkOutcome, ChunkStatus};
pub use worker::{process_chunk, serve_chunk, ChunkWorker, InProcessWorker, SubprocessWorker};
