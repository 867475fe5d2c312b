//! Report file discovery

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::IngestError;

/// Extension of ingestible report files
pub const REPORT_EXTENSION: &str = "json";

/// Walk `root` and collect every report file below it.
///
/// Fails only when `root` itself cannot be read. Subdirectories that vanish
/// or cannot be read mid-walk are skipped, symbolic links are never followed.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let entries = fs::read_dir(root).map_err(|e| IngestError::io(root, e))?;

    let mut files = Vec::new();
    collect_entries(entries, root, &mut files);

    info!(root = %root.display(), files = files.len(), "Report discovery finished");
    Ok(files)
}

fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) {
    match fs::read_dir(dir) {
        Ok(entries) => collect_entries(entries, dir, files),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Error reading directory, skipping");
        }
    }
}

fn collect_entries(entries: fs::ReadDir, dir: &Path, files: &mut Vec<PathBuf>) {
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Error reading directory entry");
                continue;
            }
        };

        let path = entry.path();

        // symlink_metadata does not follow links
        let metadata = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error reading metadata");
                continue;
            }
        };

        if metadata.is_symlink() {
            debug!(path = %path.display(), "Skipping symbolic link");
            continue;
        }

        if metadata.is_dir() {
            walk_directory(&path, files);
        } else if is_report_file(&path) {
            files.push(path);
        }
    }
}

fn is_report_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(REPORT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "[]").unwrap();
    }

    fn sorted_names(files: &[PathBuf], root: &Path) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_discover_filters_by_extension() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("scan1.json"));
        touch(&dir.path().join("README.md"));
        touch(&dir.path().join("scan2.JSON"));
        touch(&dir.path().join("noext"));

        let files = discover(dir.path()).unwrap();
        assert_eq!(sorted_names(&files, dir.path()), vec!["scan1.json"]);
    }

    #[test]
    fn test_discover_recurses_into_subdirectories() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("top.json"));
        touch(&dir.path().join("nested/deeper/inner.json"));
        touch(&dir.path().join("nested/notes.txt"));

        let files = discover(dir.path()).unwrap();
        assert_eq!(
            sorted_names(&files, dir.path()),
            vec!["nested/deeper/inner.json", "top.json"]
        );
    }

    #[test]
    fn test_discover_empty_directory() {
        let dir = TempDir::new().unwrap();
        assert!(discover(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_discover_missing_root_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = discover(&dir.path().join("does-not-exist"));
        assert!(matches!(result, Err(IngestError::Io { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_skips_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(&outside.path().join("outside.json"));
        touch(&dir.path().join("inside.json"));
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("outside.json"),
            dir.path().join("linked.json"),
        )
        .unwrap();

        let files = discover(dir.path()).unwrap();
        assert_eq!(sorted_names(&files, dir.path()), vec!["inside.json"]);
    }
}
