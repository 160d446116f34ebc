pub mod jsonl;
pub mod lock;
pub mod paths;

pub use lock::StoreLock;
pub use paths::MuninnPaths;

use muninn_core::{MuninnError, Result};
use std::io::Write;
use std::path::Path;

/// Atomic write: write to a temp file in the same directory, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| MuninnError::InvalidInput(format!("no parent dir for {}", path.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| MuninnError::io("create dir", parent, e))?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| MuninnError::io("create temp", parent, e))?;
    tmp.write_all(data)
        .map_err(|e| MuninnError::io("write", path, e))?;
    tmp.flush().map_err(|e| MuninnError::io("flush", path, e))?;
    tmp.persist(path)
        .map_err(|e| MuninnError::io("persist", path, e.error))?;
    Ok(())
}
