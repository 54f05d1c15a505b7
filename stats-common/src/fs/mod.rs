//! Local filesystem access for inputs and outputs
//!
//! Input files are always addressed relative to the input root they were
//! found under, because per-file configuration patterns match against that
//! relative path.

pub mod glob;
pub mod scanner;

use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub use glob::matches_file;
pub use scanner::FileScanner;

/// A file inside an input root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputFile {
    root: PathBuf,
    /// Path relative to `root`, `/`-separated
    relative_path: String,
}

impl InputFile {
    pub fn new(root: impl Into<PathBuf>, relative_path: impl Into<String>) -> Self {
        let relative_path: String = relative_path.into();
        Self {
            root: root.into(),
            relative_path: relative_path.replace('\\', "/").trim_start_matches('/').to_string(),
        }
    }

    /// A standalone file, treated as its own input root
    pub fn from_path(path: &Path) -> Self {
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::new(root, name)
    }

    /// Base name of the file
    pub fn name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn full_path(&self) -> PathBuf {
        self.root.join(&self.relative_path)
    }

    /// True if any pattern matches this file (see [`matches_file`])
    pub fn matches_any(&self, patterns: &[&str]) -> bool {
        patterns
            .iter()
            .any(|pattern| matches_file(pattern, &self.relative_path))
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        Path::new(self.name())
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false)
    }

    pub fn read_to_string(&self) -> Result<String> {
        read_to_string(&self.full_path())
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let path = self.full_path();
        if !path.exists() {
            return Err(Error::FileNotFound(path));
        }
        Ok(std::fs::read(path)?)
    }
}

/// Read a text file, mapping a missing file to [`Error::FileNotFound`]
pub fn read_to_string(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Write a file, creating parent directories as needed
pub fn write_bytes(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Open (creating if missing) a directory
pub fn open_dir(path: &Path) -> Result<PathBuf> {
    if path.exists() && !path.is_dir() {
        return Err(Error::InvalidInput(format!(
            "{} exists and is not a directory",
            path.display()
        )));
    }
    std::fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

/// All files under an input root
///
/// A root that is itself a file yields just that file.
pub fn list_files(root: &Path) -> Result<Vec<InputFile>> {
    if !root.exists() {
        return Err(Error::FileNotFound(root.to_path_buf()));
    }
    if root.is_file() {
        return Ok(vec![InputFile::from_path(root)]);
    }
    FileScanner::new().scan(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_file_names() {
        let file = InputFile::new("/data/input", "path/to/foo.csv");
        assert_eq!(file.name(), "foo.csv");
        assert_eq!(file.relative_path(), "path/to/foo.csv");
        assert_eq!(file.full_path(), PathBuf::from("/data/input/path/to/foo.csv"));
        assert!(file.has_extension("csv"));
        assert!(!file.has_extension("mcf"));
    }

    #[test]
    fn test_from_path() {
        let file = InputFile::from_path(Path::new("/data/input/foo.csv"));
        assert_eq!(file.root(), Path::new("/data/input"));
        assert_eq!(file.relative_path(), "foo.csv");
    }

    #[test]
    fn test_matches_any() {
        let file = InputFile::new("/data", "path/to/foo.csv");
        assert!(file.matches_any(&["*.mcf", "*.csv"]));
        assert!(!file.matches_any(&["*.mcf"]));
    }

    #[test]
    fn test_read_missing_file() {
        let file = InputFile::new("/nonexistent", "foo.csv");
        assert!(matches!(file.read_to_string(), Err(Error::FileNotFound(_))));
    }
}
