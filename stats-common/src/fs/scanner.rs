//! Input file scanner
//!
//! Recursive file discovery under an input root, skipping system files and
//! symlink loops.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::fs::InputFile;
use crate::{Error, Result};

/// Input file scanner
pub struct FileScanner {
    /// Entry names skipped along with everything below them
    ignore_names: Vec<String>,
}

impl FileScanner {
    /// Create new file scanner with the default ignore names
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git, etc.
    pub fn new() -> Self {
        Self {
            ignore_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
        }
    }

    /// Scan a directory for files
    ///
    /// Results are in walk order; callers sort as needed.
    pub fn scan(&self, root_path: &Path) -> Result<Vec<InputFile>> {
        if !root_path.exists() {
            return Err(Error::FileNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Not a directory: {}",
                root_path.display()
            )));
        }

        let mut files = Vec::new();
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let relative = entry
                        .path()
                        .strip_prefix(root_path)
                        .map_err(|e| Error::Internal(e.to_string()))?;
                    let relative = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().to_string())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.push(InputFile::new(root_path, relative));
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        tracing::debug!(
            "Scanned {}: {} files discovered",
            root_path.display(),
            files.len()
        );

        Ok(files)
    }

    fn should_process_entry(&self, entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        // The root itself is always walked.
        if entry.depth() > 0 && self.ignore_names.iter().any(|name| file_name == name.as_str()) {
            tracing::debug!("Skipping {}", path.display());
            return false;
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = path.canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", path.display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}
