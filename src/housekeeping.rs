//! Emptying of scratch and output directories between runs.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::error_handling::types::HousekeepingError;

/// Deletes everything inside `dir` but keeps `dir` itself.
///
/// Symbolic links are removed, never followed. A missing directory is not an
/// error. Returns the number of entries removed.
pub fn clean_directory(dir: &Path) -> Result<usize, HousekeepingError> {
    if !dir.is_dir() {
        warn!("{} is not a directory, nothing to clean", dir.display());
        return Ok(0);
    }

    let mut removed = 0usize;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        debug!("removed {}", path.display());
        removed += 1;
    }

    info!("Removed {} entr(ies) from {}", removed, dir.display());
    Ok(removed)
}
