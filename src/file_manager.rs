//! Maps URL paths onto the capture directory and writes fetched bytes.

use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::CaptureError;

/// Filename a URL path of `` or `/` maps to.
pub const ROOT_FILENAME: &str = "index.html";

#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    /// Creates the capture directory (and parents) if absent.
    pub fn new(base_dir: &Path) -> Result<Self, CaptureError> {
        fs::create_dir_all(base_dir).map_err(|source| CaptureError::Io {
            path: base_dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Maps a URL path component onto the capture directory.
    ///
    /// Empty and root paths map to `index.html`; otherwise the leading
    /// separator is stripped and empty segments collapse. Any `..` segment
    /// fails with `PathTraversal` — a URL path never legitimately climbs
    /// out of the tree it describes. The path is used verbatim (still
    /// percent-encoded), matching what was fetched.
    pub fn map_path(&self, url_path: &str) -> Result<PathBuf, CaptureError> {
        if url_path.is_empty() || url_path == "/" {
            return Ok(self.base_dir.join(ROOT_FILENAME));
        }
        let mut mapped = self.base_dir.clone();
        for segment in url_path.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." {
                return Err(CaptureError::PathTraversal {
                    path: url_path.to_string(),
                });
            }
            if segment == "." {
                continue;
            }
            mapped.push(segment);
        }
        if mapped == self.base_dir {
            // Path was nothing but separators and `.` segments.
            return Ok(self.base_dir.join(ROOT_FILENAME));
        }
        Ok(mapped)
    }

    /// Creates the parent directories of `dest` if missing.
    pub fn prepare_parent(&self, dest: &Path) -> Result<(), CaptureError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| CaptureError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Writes `content` verbatim at `dest`, creating parent directories
    /// first. Overwrites an existing file.
    pub fn write_file(&self, dest: &Path, content: &[u8]) -> Result<(), CaptureError> {
        self.prepare_parent(dest)?;
        tracing::debug!(path = %dest.display(), bytes = content.len(), "writing file");
        fs::write(dest, content).map_err(|source| CaptureError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }
}

/// Short display name for a URL: the last non-empty path segment, or
/// `index.html` for the root.
pub fn filename_of(url: &Url) -> String {
    url.path()
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
        .unwrap_or_else(|| ROOT_FILENAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn root_path_maps_to_index_html() {
        let dir = tempdir().unwrap();
        let files = FileManager::new(dir.path()).unwrap();
        assert_eq!(files.map_path("").unwrap(), dir.path().join(ROOT_FILENAME));
        assert_eq!(files.map_path("/").unwrap(), dir.path().join(ROOT_FILENAME));
    }

    #[test]
    fn nested_path_maps_under_base() {
        let dir = tempdir().unwrap();
        let files = FileManager::new(dir.path()).unwrap();
        let mapped = files.map_path("/assets/img/a.png").unwrap();
        assert_eq!(mapped, dir.path().join("assets").join("img").join("a.png"));
    }

    #[test]
    fn empty_segments_collapse() {
        let dir = tempdir().unwrap();
        let files = FileManager::new(dir.path()).unwrap();
        let mapped = files.map_path("//a///b.css").unwrap();
        assert_eq!(mapped, dir.path().join("a").join("b.css"));
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let files = FileManager::new(dir.path()).unwrap();
        let err = files.map_path("/../../etc/passwd").unwrap_err();
        assert!(matches!(err, CaptureError::PathTraversal { .. }));
        let err = files.map_path("/a/../../b").unwrap_err();
        assert!(matches!(err, CaptureError::PathTraversal { .. }));
    }

    #[test]
    fn write_creates_parent_dirs_and_overwrites() {
        let dir = tempdir().unwrap();
        let files = FileManager::new(dir.path()).unwrap();
        let dest = files.map_path("/deep/nested/file.txt").unwrap();
        files.write_file(&dest, b"first").unwrap();
        files.write_file(&dest, b"second").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"second");
    }

    #[test]
    fn filename_of_picks_last_segment() {
        let url = Url::parse("https://example.com/a/b/logo.png").unwrap();
        assert_eq!(filename_of(&url), "logo.png");
        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(filename_of(&root), ROOT_FILENAME);
    }
}
