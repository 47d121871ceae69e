//! Candidate discovery: the executables found in a solutions directory.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::exec::staging::io_context;

/// Regular, non-hidden files directly inside `dir`, sorted by file name.
pub fn list_candidates(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_context("read", dir, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        // Follows symlinks, so a link to a regular file counts
        let path = entry.path();
        if std::fs::metadata(&path)?.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lists_regular_visible_files_sorted() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("sol_2"), "").unwrap();
        std::fs::write(tmp.path().join("sol_1"), "").unwrap();
        std::fs::write(tmp.path().join(".hidden"), "").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();

        let found = list_candidates(tmp.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["sol_1", "sol_2"]);
        assert!(found[0].starts_with(tmp.path()));
    }

    #[test]
    fn test_empty_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(list_candidates(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_dir_names_path() {
        let err = list_candidates(Path::new("/nonexistent/solutions")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/solutions"));
    }
}
