use std::path::PathBuf;

use thiserror::Error;

/// Sandbox containment failures.
///
/// Containment is always decided on canonicalized paths, so a path that
/// cannot be canonicalized (a missing component, a dangling symlink) is
/// unverifiable and treated as forbidden rather than assumed safe.
#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    /// Path resolves to a location outside the data root
    #[error("path escapes the data root: {path}")]
    Escape { path: PathBuf },

    /// Path could not be canonicalized, so containment cannot be proven
    #[error("cannot verify containment of {path}")]
    Unverifiable { path: PathBuf },
}

/// File lookup failures.
///
/// A file that simply does not exist is not an error; resolvers return
/// `Ok(None)` for that case. These variants are security rejections and
/// must never be collapsed into "not found".
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// A caller-supplied name contains characters that could steer the
    /// search outside the conventional directory tree
    #[error("invalid characters in {what}: {value:?}")]
    InvalidName { what: &'static str, value: String },
}

/// Bearer token verification failures.
///
/// Clients only ever see a single forbidden outcome; the variants exist
/// so the logs can tell an expired token from a forged one.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// Token is not three dot-separated base64url segments
    #[error("token is not a well-formed JWT")]
    Malformed,

    /// Header names an algorithm other than HS256 (including "none")
    #[error("unsupported token algorithm: {0:?}")]
    UnsupportedAlgorithm(String),

    /// HMAC over the signing input does not match the signature
    #[error("token signature mismatch")]
    BadSignature,

    #[error("token expired at {expired_at} (current time: {now})")]
    Expired { expired_at: u64, now: u64 },

    /// Claims are missing, of the wrong type, or carry an unknown role
    #[error("invalid token claims: {0}")]
    InvalidClaims(String),
}

/// Entitlement lookup failures against the authorization service.
///
/// Both variants are fatal for the request being checked; the gate never
/// fails open on an upstream problem.
#[derive(Debug, Clone, Error)]
pub enum EntitlementError {
    /// Service answered with a non-success status
    #[error("authorization service returned status {status}")]
    Status { status: u16 },

    /// Service unreachable or the response body was unusable
    #[error("authorization service unreachable: {0}")]
    Transport(String),
}
