//! Chunk planning for oversized captures.
//!
//! Inputs above the configured threshold are cut by `editcap -c <packets>`
//! into a scratch directory. editcap names its output
//! `<prefix>_<sequence>_<timestamp>.<ext>`, so chunks are ordered by the
//! sequence number rather than by name.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, error, info, warn};
use regex::Regex;
use tempfile::TempDir;

use super::types::ChunkDescriptor;
use crate::configuration::types::Config;
use crate::error_handling::types::DispatchError;

const CHUNK_PREFIX: &str = "chunk";

/// Scratch directory holding the chunk files of one run.
///
/// Always a fresh directory, so its listing only ever holds what the splitter
/// wrote for this run.
#[derive(Debug)]
struct ChunkWorkspace {
    dir: TempDir,
    /// Configured parent this run had to create.
    created_parent: Option<PathBuf>,
}

impl ChunkWorkspace {
    fn prepare(chunk_dir: Option<&Path>) -> Result<Self, DispatchError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("flowsift-");
        let parent = match chunk_dir {
            None => {
                return Ok(ChunkWorkspace {
                    dir: builder.tempdir()?,
                    created_parent: None,
                });
            }
            Some(parent) => parent,
        };

        let created_parent = if parent.is_dir() {
            None
        } else {
            fs::create_dir_all(parent)?;
            Some(parent.to_path_buf())
        };
        match builder.tempdir_in(parent) {
            Ok(dir) => Ok(ChunkWorkspace {
                dir,
                created_parent,
            }),
            Err(e) => {
                if let Some(created) = created_parent {
                    let _ = fs::remove_dir(created);
                }
                Err(e.into())
            }
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn remove(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed chunk directory {}", path.display()),
            Err(e) => warn!("Could not remove chunk directory {}: {}", path.display(), e),
        }
        if let Some(parent) = self.created_parent {
            // only if nothing else landed there meanwhile
            if let Err(e) = fs::remove_dir(&parent) {
                debug!("Keeping {}: {}", parent.display(), e);
            }
        }
    }
}

/// The chunks of one input and the scratch space they live in.
#[derive(Debug)]
pub struct ChunkPlan {
    pub chunks: Vec<ChunkDescriptor>,
    workspace: Option<ChunkWorkspace>,
}

impl ChunkPlan {
    pub fn is_split(&self) -> bool {
        self.workspace.is_some()
    }

    pub fn chunk_dir(&self) -> Option<&Path> {
        self.workspace.as_ref().map(ChunkWorkspace::path)
    }

    /// Releases every chunk and removes the run's scratch directory, plus the
    /// configured chunk directory when this run created it.
    pub fn cleanup(self) {
        for chunk in &self.chunks {
            chunk.release();
        }
        if let Some(workspace) = self.workspace {
            workspace.remove();
        }
    }
}

/// Decides how `input` is processed: whole, or split into transient chunks.
///
/// Splitting failures are fatal for the run.
pub fn plan_chunks(input: &Path, config: &Config) -> Result<ChunkPlan, DispatchError> {
    let size = fs::metadata(input)
        .map_err(|e| {
            error!("Cannot read input {}: {}", input.display(), e);
            e
        })?
        .len();

    if size <= config.split_threshold_bytes {
        debug!(
            "{} is {} bytes, processing it whole",
            input.display(),
            size
        );
        return Ok(ChunkPlan {
            chunks: vec![ChunkDescriptor {
                index: 0,
                path: input.to_path_buf(),
                transient: false,
            }],
            workspace: None,
        });
    }

    info!(
        "{} is {} bytes (threshold {}), splitting every {} packets",
        input.display(),
        size,
        config.split_threshold_bytes,
        config.packets_per_chunk
    );
    let workspace = ChunkWorkspace::prepare(config.chunk_dir.as_deref())?;

    let chunks = run_splitter(&config.editcap(), input, workspace.path(), config.packets_per_chunk)
        .and_then(|()| collect_chunks(workspace.path(), input));
    let chunks = match chunks {
        Ok(chunks) if chunks.is_empty() => {
            workspace.remove();
            return Err(DispatchError::NoChunks);
        }
        Ok(chunks) => chunks,
        Err(e) => {
            error!("Splitting {} failed: {}", input.display(), e);
            workspace.remove();
            return Err(e);
        }
    };

    info!("Split into {} chunk(s)", chunks.len());
    Ok(ChunkPlan {
        chunks: chunks
            .into_iter()
            .enumerate()
            .map(|(index, path)| ChunkDescriptor {
                index,
                path,
                transient: true,
            })
            .collect(),
        workspace: Some(workspace),
    })
}

fn run_splitter(
    editcap: &Path,
    input: &Path,
    out_dir: &Path,
    packets_per_chunk: u64,
) -> Result<(), DispatchError> {
    debug!("Running splitter {}", editcap.display());
    let output = Command::new(editcap)
        .arg("-c")
        .arg(packets_per_chunk.to_string())
        .arg(input)
        .arg(out_dir.join(CHUNK_PREFIX))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            DispatchError::SplitFailed(format!("cannot start {}: {}", editcap.display(), e))
        })?;

    if !output.status.success() {
        return Err(DispatchError::SplitFailed(format!(
            "{} exited with {}: {}",
            editcap.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Lists chunk files in `dir`, in split order. `input` itself is never
/// listed, even when reached through a link.
fn collect_chunks(dir: &Path, input: &Path) -> Result<Vec<PathBuf>, DispatchError> {
    let sequence = Regex::new(&format!(r"^{}_(\d+)", CHUNK_PREFIX)).ok();
    let input = fs::canonicalize(input).ok();

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(CHUNK_PREFIX) || !path.is_file() {
            continue;
        }
        if input.is_some() && fs::canonicalize(&path).ok() == input {
            warn!("{} resolves to the input, not treating it as a chunk", path.display());
            continue;
        }
        let seq = sequence
            .as_ref()
            .and_then(|re| re.captures(&name))
            .and_then(|caps| caps[1].parse::<u64>().ok());
        found.push((seq, name, path));
    }

    // numbered chunks first, by number; anything else by name
    found.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(&b.1)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });
    Ok(found.into_iter().map(|(_, _, path)| path).collect())
}
