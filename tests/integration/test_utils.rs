//! Test utilities for integration tests.
//!
//! This module provides a mock entitlement provider and helpers for
//! building a populated data root and a router around it.

use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use datagate::auth::{EntitlementProvider, PermissionGate, Role, TokenAuthenticator};
use datagate::error::EntitlementError;
use datagate::fs::PathResolver;
use datagate::server::{create_router, RouterConfig};

/// Secret shared between the test router and issued tokens.
pub const TEST_SECRET: &str = "integration-secret";

/// Static API key the test router accepts.
pub const TEST_API_KEY: &str = "service-api-key";

// =============================================================================
// Mock Entitlement Provider
// =============================================================================

/// Entitlement provider backed by a fixed list, or failing on demand.
pub struct MockEntitlements {
    experiments: Vec<u32>,
    fail: bool,
}

impl MockEntitlements {
    /// Provider that grants the same experiments to every user number.
    pub fn allowing(experiments: Vec<u32>) -> Self {
        Self {
            experiments,
            fail: false,
        }
    }

    /// Provider whose lookups always fail, as an unreachable
    /// authorization service would.
    pub fn failing() -> Self {
        Self {
            experiments: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl EntitlementProvider for MockEntitlements {
    async fn experiments_for(&self, _user_number: u32) -> Result<Vec<u32>, EntitlementError> {
        if self.fail {
            Err(EntitlementError::Transport("connection refused".into()))
        } else {
            Ok(self.experiments.clone())
        }
    }
}

// =============================================================================
// Data Root Helpers
// =============================================================================

/// Create an empty data root.
pub fn data_root() -> TempDir {
    TempDir::new().expect("failed to create temp data root")
}

/// Write `contents` to `rel` under `root`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create parent dirs");
    }
    fs::write(&path, contents).expect("failed to write test file");
}

/// Conventional autoreduced path for an instrument experiment.
pub fn instrument_rel(instrument: &str, experiment_number: u32, rel: &str) -> String {
    format!("{instrument}/RBNumber/RB{experiment_number}/autoreduced/{rel}")
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Build a router over `root` with the gate fully enabled.
pub fn router_for(root: &Path, entitlements: MockEntitlements) -> Router {
    build_router(root, entitlements, false)
}

/// Build a router over `root` with the gate disabled.
pub fn dev_router_for(root: &Path) -> Router {
    build_router(root, MockEntitlements::allowing(Vec::new()), true)
}

fn build_router(root: &Path, entitlements: MockEntitlements, dev_mode: bool) -> Router {
    let resolver = PathResolver::new(root).expect("data root should resolve");
    let gate = PermissionGate::new(
        TokenAuthenticator::new(TEST_SECRET),
        entitlements,
        Some(TEST_API_KEY.to_string()),
    )
    .with_dev_mode(dev_mode);

    create_router(resolver, gate, RouterConfig::default().with_tracing(false))
}

/// Issue a token the test router will accept.
pub fn token_for(user_number: u32, role: Role) -> String {
    TokenAuthenticator::new(TEST_SECRET).issue(user_number, role, Duration::from_secs(3600))
}

/// Issue an already-expired token.
pub fn expired_token_for(user_number: u32, role: Role) -> String {
    TokenAuthenticator::new(TEST_SECRET).issue_with_expiry(user_number, role, 1)
}

/// Send a GET through the router with an optional bearer token.
pub async fn get(router: Router, uri: &str, token: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder.body(Body::empty()).expect("request should build");
    router.oneshot(request).await.expect("router should respond")
}

/// Collect a response body into a string.
pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("body should be utf-8")
}

/// Assert an error response shape: status code plus the `error` field
/// of the JSON body.
pub async fn assert_error(response: Response<Body>, status: StatusCode, error_type: &str) {
    assert_eq!(response.status(), status);
    let body = body_string(response).await;
    let json: serde_json::Value = serde_json::from_str(&body).expect("error body should be JSON");
    assert_eq!(json["error"], error_type, "unexpected body: {body}");
}
