//! Working directory lifecycle
//!
//! Every run stages its files in a directory nobody else uses. The directory
//! is removed when its [`WorkDir`] is dropped, on every exit path.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, instrument};

use crate::sandbox::SandboxError;

/// An exclusively owned, self-removing directory
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Create a uniquely named directory under `root`
    ///
    /// `root` is created if it does not exist.
    #[instrument]
    pub fn create(root: &Path, prefix: &str) -> Result<Self, SandboxError> {
        let to_error = |source: std::io::Error| SandboxError::WorkDir {
            root: root.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(root).map_err(to_error)?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(root)
            .map_err(to_error)?;

        debug!(path = %dir.path().display(), "created working directory");
        Ok(Self { dir })
    }

    /// Get the path to the directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get the path to a file inside the directory
    ///
    /// Returns an error if the name attempts path traversal.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(SandboxError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.dir.path().join(name))
    }

    /// Create a sub-directory and return its path
    pub async fn create_subdir(&self, name: &str) -> Result<PathBuf, SandboxError> {
        let path = self.file_path(name)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Write a file into the directory
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf, SandboxError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file");
        Ok(path)
    }

}
