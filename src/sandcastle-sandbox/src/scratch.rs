//! Sandbox scratch directory.
//!
//! The supervised command's temporary files (`TMPDIR`) live here. A directory
//! created by the supervisor is removed when the supervisor exits; one
//! supplied by the caller is left alone.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::{SandboxError, SandboxResult};

/// Environment variable overriding the root under which scratch directories
/// are created.
pub const SCRATCH_ROOT_ENV: &str = "SANDBOX_TMPDIR";

const SCRATCH_PREFIX: &str = "sandcastle-";

/// Root directory for supervisor-created scratch directories.
pub fn scratch_root() -> PathBuf {
    std::env::var_os(SCRATCH_ROOT_ENV)
        .filter(|root| !root.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// A scratch directory and, if the supervisor created it, its lifecycle.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    owned: Option<TempDir>,
}

impl ScratchDir {
    /// Adopt `explicit` if given, otherwise create a fresh directory under
    /// [`scratch_root`].
    pub fn acquire(explicit: Option<&Path>) -> SandboxResult<Self> {
        match explicit {
            Some(path) => Self::adopt(path),
            None => Self::create_in(&scratch_root()),
        }
    }

    /// Use a caller-supplied directory, creating it if absent.
    ///
    /// The supervisor never removes an adopted directory.
    pub fn adopt(path: &Path) -> SandboxResult<Self> {
        let path = absolute(path)?;
        std::fs::create_dir_all(&path).map_err(|source| SandboxError::Scratch {
            path: path.clone(),
            source,
        })?;

        debug!("Using caller-supplied scratch directory {}", path.display());
        Ok(Self { path, owned: None })
    }

    /// Create a uniquely named directory under `root`.
    pub fn create_in(root: &Path) -> SandboxResult<Self> {
        let root = absolute(root)?;
        std::fs::create_dir_all(&root).map_err(|source| SandboxError::Scratch {
            path: root.clone(),
            source,
        })?;

        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&root)
            .map_err(|source| SandboxError::Scratch {
                path: root.clone(),
                source,
            })?;

        let path = dir.path().to_path_buf();
        debug!("Created scratch directory {}", path.display());
        Ok(Self {
            path,
            owned: Some(dir),
        })
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the supervisor is responsible for removing the directory.
    pub fn owns_lifecycle(&self) -> bool {
        self.owned.is_some()
    }

    /// Remove the directory if the supervisor owns it. Errors are ignored.
    pub fn release(self) {
        let Some(dir) = self.owned else {
            return;
        };

        match dir.close() {
            Ok(()) => debug!("Removed scratch directory {}", self.path.display()),
            Err(e) => debug!(
                "Failed to remove scratch directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

fn absolute(path: &Path) -> SandboxResult<PathBuf> {
    std::path::absolute(path).map_err(|source| SandboxError::Scratch {
        path: path.to_path_buf(),
        source,
    })
}
