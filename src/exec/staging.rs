//! Scratch file layout for capture and input files.
//!
//! Both are keyed by executable base name and parameter, which is unique
//! within a run, so no two jobs ever touch the same file.

use std::path::{Path, PathBuf};

use crate::domain::Job;
use crate::error::GraderError;

/// `<output_dir>/<exe_name>.<param>`
pub fn capture_path(output_dir: &Path, job: &Job) -> PathBuf {
    output_dir.join(format!("{}.{}", job.name(), job.parameter))
}

/// `<input_dir>/<exe_name>.<param>.in`
pub fn input_path(input_dir: &Path, job: &Job) -> PathBuf {
    input_dir.join(format!("{}.{}.in", job.name(), job.parameter))
}

/// Attach the path and operation to an IO error.
pub(crate) fn io_context(op: &str, path: &Path, err: std::io::Error) -> GraderError {
    GraderError::Io(std::io::Error::new(
        err.kind(),
        format!("{} {}: {}", op, path.display(), err),
    ))
}

/// Remove a scratch file; a file that is already gone is fine.
pub(crate) fn remove_scratch(path: &Path) -> crate::error::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_context("remove", path, e)),
    }
}
