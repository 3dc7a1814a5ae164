//! Filesystem layer: sandbox containment, conventional path resolution
//! and polling snapshots for live-data watching.

pub mod resolver;
pub mod sandbox;
pub mod watch;

pub use resolver::{validate_name, PathResolver};
pub use sandbox::SandboxGuard;
pub use watch::{diff_snapshots, snapshot_dir, ChangeType, FileChange, FileSnapshot};
