//! Utility functions for ollamab-core

use std::fs;
use std::path::Path;

/// Calculate the total size of a path (file or directory) in bytes
///
/// Returns 0 for paths that cannot be accessed.
pub fn calculate_path_size<P: AsRef<Path>>(path: P) -> u64 {
    let path = path.as_ref();

    if path.is_file() {
        fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    } else if path.is_dir() {
        let mut size = 0;
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                size += calculate_path_size(entry.path());
            }
        }
        size
    } else {
        0
    }
}

/// Count the regular files below a directory
///
/// Used to size the progress bar before a backup run.
pub fn count_regular_files<P: AsRef<Path>>(path: P) -> u64 {
    walkdir::WalkDir::new(path.as_ref())
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count() as u64
}
