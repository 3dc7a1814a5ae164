//! # Datagate
//!
//! A thin HTTP gateway that serves scientific instrument data files
//! (NeXus/HDF5, TIFF, reduction logs) from a shared filesystem, gated
//! by per-experiment authorization.
//!
//! The gateway owns no data. It resolves conventional paths on the
//! shared archive, keeps every access inside a sandboxed root, and asks
//! an external authorization service which experiments a user may read.
//!
//! ## Features
//!
//! - **Conventional path resolution**: instrument, experiment and user
//!   number trees, with a recursive fallback search
//! - **Sandboxing**: symlink-safe containment checks on every resolved
//!   path, on top of a filename character blacklist
//! - **JWT authorization**: HMAC-SHA256 bearer tokens with staff and
//!   user roles, entitlements fetched per-request
//! - **Live data**: server-sent events streaming file changes from an
//!   instrument's live-reduction directory
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`fs`] - Path resolution, sandboxing, and directory snapshots
//! - [`auth`] - Token verification, entitlements, and the request gate
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//! - [`error`] - Error types shared across the crate

pub mod auth;
pub mod config;
pub mod error;
pub mod fs;
pub mod server;

// Re-export commonly used types
pub use auth::{
    permission_middleware, EntitlementProvider, HttpEntitlementProvider, Identity,
    PermissionGate, Role, TokenAuthenticator,
};
pub use config::{CheckConfig, Cli, Command, ServeConfig, TokenConfig};
pub use error::{EntitlementError, LookupError, SandboxError, TokenError};
pub use fs::{PathResolver, SandboxGuard};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
