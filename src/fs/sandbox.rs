//! Containment checks for resolved filesystem paths.
//!
//! Every path derived from user input must be proven to sit under the
//! configured data root before it is opened or echoed back to a client.
//! The proof is done on canonicalized paths with component-wise ancestor
//! containment: a string prefix test would accept `/ceph-evil` as being
//! inside `/ceph`, and a non-canonical test would miss symlinks pointing
//! out of the tree.
//!
//! A path that cannot be canonicalized (missing component, dangling
//! symlink) cannot be verified and is rejected, never assumed safe.

use std::path::{Path, PathBuf};

use crate::error::SandboxError;

/// Guard enforcing that candidate paths stay inside a fixed root.
#[derive(Debug, Clone)]
pub struct SandboxGuard {
    root: PathBuf,
}

impl SandboxGuard {
    /// Create a guard for `root`. The root itself must exist so it can
    /// be canonicalized once up front.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|_| SandboxError::Unverifiable {
                path: root.to_path_buf(),
            })?;
        Ok(Self { root })
    }

    /// The canonicalized root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonicalize `path` and prove it sits under the root.
    ///
    /// Returns the canonical form on success so callers operate on the
    /// symlink-free path from here on.
    pub fn check(&self, path: &Path) -> Result<PathBuf, SandboxError> {
        let resolved = path
            .canonicalize()
            .map_err(|_| SandboxError::Unverifiable {
                path: path.to_path_buf(),
            })?;
        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(SandboxError::Escape {
                path: path.to_path_buf(),
            })
        }
    }

    /// Root-relative form of a contained path, for client-facing
    /// responses that must not leak the absolute mount point.
    pub fn relative(&self, path: &Path) -> Result<PathBuf, SandboxError> {
        let resolved = self.check(path)?;
        // strip_prefix cannot fail after the containment check
        let relative = resolved.strip_prefix(&self.root).unwrap_or(&resolved);
        Ok(relative.to_path_buf())
    }
}

// =============================================================================
// Tests
// =============================================================================
