//! Path resolution under the fixed autoreduction directory conventions.
//!
//! The shared filesystem follows an externally imposed layout:
//!
//! ```text
//! {root}/{INSTRUMENT}/RBNumber/RB{n}/autoreduced/{filename}
//! {root}/{INSTRUMENT}/RBNumber/unknown/autoreduced/...
//! {root}/GENERIC/autoreduce/ExperimentNumbers/{n}/...
//! {root}/GENERIC/autoreduce/UserNumbers/{n}/...
//! {root}/GENERIC[-staging]/livereduce/{INSTRUMENT}
//! ```
//!
//! Instrument-scoped lookup tries the exact conventional path first (a
//! single stat), then falls back to a recursive name search under the
//! experiment's `autoreduced` subtree, then under the `unknown`
//! fallback subtree. Generic lookups are a single recursive search with
//! no fast path and no fallback.
//!
//! Every search root is checked against the [`SandboxGuard`] before it
//! is walked, and every returned file is checked again individually, so
//! a symlink planted inside the tree cannot leak a path outside it.
//!
//! Not-found is `Ok(None)`; only security rejections are errors.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{LookupError, SandboxError};
use crate::fs::sandbox::SandboxGuard;

/// Fragments that must never appear in a caller-supplied instrument
/// name or filename.
const FORBIDDEN_FRAGMENTS: [&str; 4] = ["..", "/", "\\", "~"];

/// Reject names that could steer a lookup outside the conventional
/// tree. Runs before any filesystem access.
pub fn validate_name(what: &'static str, value: &str) -> Result<(), LookupError> {
    if FORBIDDEN_FRAGMENTS.iter().any(|frag| value.contains(frag)) {
        return Err(LookupError::InvalidName {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Resolves (instrument, experiment, user, filename) identifiers to
/// existing files under the data root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    guard: SandboxGuard,
}

impl PathResolver {
    /// Create a resolver rooted at `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let guard = SandboxGuard::new(root)?;
        Ok(Self {
            root: guard.root().to_path_buf(),
            guard,
        })
    }

    /// The canonicalized data root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The containment guard, shared with callers that need to produce
    /// root-relative paths.
    pub fn guard(&self) -> &SandboxGuard {
        &self.guard
    }

    /// Locate a file belonging to an instrument-scoped experiment.
    ///
    /// Tries the exact conventional path, then a recursive search under
    /// the experiment's `autoreduced` subtree, then the same search
    /// under `RBNumber/unknown/autoreduced`.
    pub fn find_instrument_file(
        &self,
        instrument: &str,
        experiment_number: u32,
        filename: &str,
    ) -> Result<Option<PathBuf>, LookupError> {
        validate_name("instrument", instrument)?;
        validate_name("filename", filename)?;

        let rb_root = self.root.join(instrument.to_uppercase()).join("RBNumber");
        let autoreduced = rb_root
            .join(format!("RB{experiment_number}"))
            .join("autoreduced");

        let exact = autoreduced.join(filename);
        if exact.is_file() {
            debug!(path = %exact.display(), "fast path hit");
            return Ok(Some(self.guard.check(&exact)?));
        }

        if let Some(found) = self.search_tree(&autoreduced, filename)? {
            return Ok(Some(found));
        }
        self.search_tree(&rb_root.join("unknown").join("autoreduced"), filename)
    }

    /// Locate a file under the generic experiment-number tree.
    pub fn find_experiment_file(
        &self,
        experiment_number: u32,
        filename: &str,
    ) -> Result<Option<PathBuf>, LookupError> {
        validate_name("filename", filename)?;
        let dir = self
            .root
            .join("GENERIC")
            .join("autoreduce")
            .join("ExperimentNumbers")
            .join(experiment_number.to_string());
        self.search_tree(&dir, filename)
    }

    /// Locate a file under the generic user-number tree.
    pub fn find_user_file(
        &self,
        user_number: u32,
        filename: &str,
    ) -> Result<Option<PathBuf>, LookupError> {
        validate_name("filename", filename)?;
        let dir = self
            .root
            .join("GENERIC")
            .join("autoreduce")
            .join("UserNumbers")
            .join(user_number.to_string());
        self.search_tree(&dir, filename)
    }

    /// The flat live-data directory for an instrument, or `None` when
    /// the instrument has no such directory. Never searched recursively.
    pub fn live_data_dir(
        &self,
        instrument: &str,
        production: bool,
    ) -> Result<Option<PathBuf>, LookupError> {
        validate_name("instrument", instrument)?;
        let generic = if production { "GENERIC" } else { "GENERIC-staging" };
        let dir = self
            .root
            .join(generic)
            .join("livereduce")
            .join(instrument.to_uppercase());
        if !dir.is_dir() {
            return Ok(None);
        }
        Ok(Some(self.guard.check(&dir)?))
    }

    /// Recursively search `dir` for a file named exactly `filename`.
    ///
    /// Walk order is filesystem-dependent; among duplicate names the
    /// first visited wins and callers must not rely on which. The
    /// directory is containment-checked before walking and the match is
    /// checked again before it is returned.
    fn search_tree(&self, dir: &Path, filename: &str) -> Result<Option<PathBuf>, LookupError> {
        if !dir.exists() {
            return Ok(None);
        }
        self.guard.check(dir)?;

        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && entry.file_name().to_str() == Some(filename) {
                return Ok(Some(self.guard.check(entry.path())?));
            }
        }
        Ok(None)
    }
}

// =============================================================================
// Tests
// =============================================================================
