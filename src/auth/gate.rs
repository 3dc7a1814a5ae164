//! Request authorization.
//!
//! One ordered, short-circuiting policy guards every protected route:
//!
//! 1. dev mode disables the gate entirely (loudly logged at startup);
//! 2. `OPTIONS` preflights, `/healthz`, `/docs` and `/live-data/*` are
//!    open;
//! 3. a bearer credential must be present, from the `Authorization`
//!    header or a `token` query parameter for transports that cannot
//!    set headers (SSE);
//! 4. a token equal to the configured static API key is allowed without
//!    decoding, for trusted service-to-service calls;
//! 5. otherwise the token must verify as a JWT;
//! 6. staff identities are allowed unconditionally;
//! 7. user-number routes require the path's user number to match the
//!    identity;
//! 8. everything else requires the request's experiment number to be in
//!    the identity's entitlement set, fetched fresh from the
//!    authorization service. Upstream failure fails the request closed.
//!
//! The gate always runs before any file I/O for the request.

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

use super::entitlements::EntitlementProvider;
use super::token::TokenAuthenticator;
use crate::error::TokenError;
use crate::server::handlers::ErrorResponse;

/// Exact paths that never require authorization.
const OPEN_PATHS: [&str; 2] = ["/healthz", "/docs"];

/// Path prefixes that never require authorization. Live data is
/// instrument-scoped by design, not experiment-scoped.
const OPEN_PREFIXES: [&str; 1] = ["/live-data/"];

// =============================================================================
// Gate Errors
// =============================================================================

/// Gate rejection. Clients see a status code and a generic message;
/// internal detail (expired vs forged token, upstream status) only ever
/// reaches the logs, to avoid aiding enumeration.
#[derive(Debug, Clone)]
pub enum GateError {
    /// No usable bearer credential on the request
    Unauthenticated,

    /// Credential invalid, or identity not entitled to the target
    Forbidden,

    /// Protected route with no extractable experiment number
    MissingExperimentNumber,

    /// Authorization service unreachable or non-success; fails closed
    Upstream(String),
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::Unauthenticated => write!(f, "Unauthenticated"),
            GateError::Forbidden => write!(f, "Forbidden"),
            GateError::MissingExperimentNumber => {
                write!(f, "No experiment number found in request")
            }
            GateError::Upstream(detail) => {
                write!(f, "Could not contact the authorization service: {detail}")
            }
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            GateError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "Unauthenticated".to_string(),
            ),
            GateError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "Forbidden".to_string(),
            ),
            GateError::MissingExperimentNumber => (
                StatusCode::BAD_REQUEST,
                "missing_experiment_number",
                "No experiment number found in request".to_string(),
            ),
            GateError::Upstream(detail) => {
                error!(
                    error_type = "authorization_unavailable",
                    "entitlement lookup failed: {detail}"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "authorization_unavailable",
                    "Could not check permissions".to_string(),
                )
            }
        };

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Permission Gate
// =============================================================================

/// The authorization policy, shared as middleware state.
pub struct PermissionGate<E> {
    authenticator: TokenAuthenticator,
    entitlements: Arc<E>,
    api_key: Option<String>,
    dev_mode: bool,
}

impl<E> Clone for PermissionGate<E> {
    fn clone(&self) -> Self {
        Self {
            authenticator: self.authenticator.clone(),
            entitlements: Arc::clone(&self.entitlements),
            api_key: self.api_key.clone(),
            dev_mode: self.dev_mode,
        }
    }
}

impl<E: EntitlementProvider> PermissionGate<E> {
    pub fn new(
        authenticator: TokenAuthenticator,
        entitlements: E,
        api_key: Option<String>,
    ) -> Self {
        Self {
            authenticator,
            entitlements: Arc::new(entitlements),
            api_key,
            dev_mode: false,
        }
    }

    /// Disable the gate for every request. Development only; the server
    /// startup path warns loudly when this is set.
    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    /// The authorization decision for one request.
    pub async fn authorize(
        &self,
        method: &Method,
        path: &str,
        query: &str,
        bearer: Option<&str>,
    ) -> Result<(), GateError> {
        if self.dev_mode {
            return Ok(());
        }
        if method == Method::OPTIONS || is_open_path(path) {
            return Ok(());
        }

        debug!(path, "checking permissions");
        let token = bearer.ok_or(GateError::Unauthenticated)?;

        if let Some(api_key) = self.api_key.as_deref() {
            // Constant-time, like the JWT signature check
            let matches = bool::from(token.as_bytes().ct_eq(api_key.as_bytes()));
            if !api_key.is_empty() && matches {
                debug!(path, "request authorized by service api key");
                return Ok(());
            }
        }

        let identity = self.authenticator.decode(token).map_err(|err| {
            // Expired tokens are routine; anything else may be an attack
            match err {
                TokenError::Expired { .. } => debug!("rejected bearer token: {err}"),
                _ => warn!("rejected bearer token: {err}"),
            }
            GateError::Forbidden
        })?;

        if identity.is_staff() {
            return Ok(());
        }

        if let Some(user_number) = user_number_segment(path) {
            return if user_number == identity.user_number {
                Ok(())
            } else {
                Err(GateError::Forbidden)
            };
        }

        let experiment_number =
            extract_experiment_number(path, query).ok_or(GateError::MissingExperimentNumber)?;

        let allowed = self
            .entitlements
            .experiments_for(identity.user_number)
            .await
            .map_err(|err| GateError::Upstream(err.to_string()))?;

        if allowed.contains(&experiment_number) {
            Ok(())
        } else {
            info!(
                user_number = identity.user_number,
                experiment_number, "experiment not in user's entitlements"
            );
            Err(GateError::Forbidden)
        }
    }
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Axum middleware applying the gate to every request not covered by a
/// bypass rule.
pub async fn permission_middleware<E: EntitlementProvider>(
    State(gate): State<PermissionGate<E>>,
    OriginalUri(original_uri): OriginalUri,
    request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let path = original_uri.path();
    let query = original_uri.query().unwrap_or("");
    let token = bearer_token(request.headers(), query);

    gate.authorize(request.method(), path, query, token.as_deref())
        .await?;

    Ok(next.run(request).await)
}

// =============================================================================
// Request Parsing
// =============================================================================

fn is_open_path(path: &str) -> bool {
    OPEN_PATHS.contains(&path) || OPEN_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Bearer credential from the `Authorization` header, falling back to a
/// `token` query parameter for transports that cannot set headers.
pub fn bearer_token(headers: &HeaderMap, query: &str) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        return value.strip_prefix("Bearer ").map(str::to_string);
    }
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

/// User number for `/find_file/generic/user_number/{n}` routes, which
/// carry no experiment number at all.
fn user_number_segment(path: &str) -> Option<u32> {
    path.strip_prefix("/find_file/generic/user_number/")
        .and_then(|rest| rest.split('/').next())
        .and_then(|segment| segment.parse().ok())
}

/// Experiment number for a protected request.
///
/// Three extraction rules, matched against the request shape:
/// - text-file routes carry it as the final path segment;
/// - find-file routes carry it immediately after a literal
///   `experiment_number` segment;
/// - anything else carries it inside a URL-encoded file path in the
///   query string, as `%2FRB<digits>%2F`.
pub fn extract_experiment_number(path: &str, query: &str) -> Option<u32> {
    if path.starts_with("/text/") {
        return path.rsplit('/').next().and_then(|s| s.parse().ok());
    }
    if path.starts_with("/find_file/") {
        let mut segments = path.split('/');
        while let Some(segment) = segments.next() {
            if segment == "experiment_number" {
                return segments.next().and_then(|s| s.parse().ok());
            }
        }
        return None;
    }
    rb_number_in_query(query)
}

/// Match `%2FRB<digits>%2F` in a raw (still-encoded) query string.
fn rb_number_in_query(query: &str) -> Option<u32> {
    let mut rest = query;
    while let Some(idx) = rest.find("%2FRB") {
        let tail = &rest[idx + 5..];
        let end = tail
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(tail.len());
        if end > 0 && tail[end..].starts_with("%2F") {
            if let Ok(n) = tail[..end].parse() {
                return Some(n);
            }
        }
        rest = &rest[idx + 5..];
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
