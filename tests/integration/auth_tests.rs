//! Authorization integration tests.
//!
//! Tests verify the full gate policy through the router:
//! - Missing, malformed and expired credentials
//! - Entitlement checks for ordinary users
//! - Staff and api-key bypasses
//! - User-number route ownership
//! - Dev mode and fail-closed behavior

use axum::http::StatusCode;

use datagate::auth::Role;

use super::test_utils::{
    assert_error, data_root, dev_router_for, get, instrument_rel, router_for, token_for,
    expired_token_for, write_file, MockEntitlements, TEST_API_KEY,
};

const TEXT_URI: &str = "/text/instrument/MARI/experiment_number/1234?filename=run.log";

fn populated_root() -> tempfile::TempDir {
    let root = data_root();
    write_file(root.path(), &instrument_rel("MARI", 1234, "run.log"), "ok");
    root
}

// =============================================================================
// Credential Presence and Validity
// =============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(vec![1234]));

    let response = get(router, TEXT_URI, None).await;
    assert_error(response, StatusCode::UNAUTHORIZED, "unauthenticated").await;
}

#[tokio::test]
async fn test_malformed_token_is_forbidden() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(vec![1234]));

    let response = get(router, TEXT_URI, Some("not-a-jwt")).await;
    assert_error(response, StatusCode::FORBIDDEN, "forbidden").await;
}

#[tokio::test]
async fn test_expired_token_is_forbidden() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(vec![1234]));
    let token = expired_token_for(7, Role::User);

    let response = get(router, TEXT_URI, Some(&token)).await;
    assert_error(response, StatusCode::FORBIDDEN, "forbidden").await;
}

#[tokio::test]
async fn test_token_accepted_from_query_parameter() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(vec![1234]));
    let token = token_for(7, Role::User);

    let uri = format!("{TEXT_URI}&token={token}");
    let response = get(router, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Entitlements
// =============================================================================

#[tokio::test]
async fn test_entitled_user_is_allowed() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(vec![1234]));
    let token = token_for(7, Role::User);

    let response = get(router, TEXT_URI, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unentitled_user_is_forbidden() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(vec![9999]));
    let token = token_for(7, Role::User);

    let response = get(router, TEXT_URI, Some(&token)).await;
    assert_error(response, StatusCode::FORBIDDEN, "forbidden").await;
}

#[tokio::test]
async fn test_unreachable_authorization_service_fails_closed() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::failing());
    let token = token_for(7, Role::User);

    let response = get(router, TEXT_URI, Some(&token)).await;
    assert_error(
        response,
        StatusCode::INTERNAL_SERVER_ERROR,
        "authorization_unavailable",
    )
    .await;
}

// =============================================================================
// Bypasses
// =============================================================================

#[tokio::test]
async fn test_staff_bypasses_entitlements() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));
    let token = token_for(7, Role::Staff);

    let response = get(router, TEXT_URI, Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_bearer_is_allowed() {
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));

    let response = get(router, TEXT_URI, Some(TEST_API_KEY)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_other_service_credential_is_not_accepted() {
    // Only the configured inbound key is a bypass; any other opaque
    // credential (such as the one this gateway sends upstream) falls
    // through to JWT decoding and is rejected
    let root = populated_root();
    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));

    let response = get(router, TEXT_URI, Some("upstream-service-key")).await;
    assert_error(response, StatusCode::FORBIDDEN, "forbidden").await;
}

#[tokio::test]
async fn test_dev_mode_allows_everything() {
    let root = populated_root();
    let router = dev_router_for(root.path());

    let response = get(router, TEXT_URI, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// User-Number Routes
// =============================================================================

#[tokio::test]
async fn test_user_number_route_owner_allowed() {
    let root = data_root();
    write_file(
        root.path(),
        "GENERIC/autoreduce/UserNumbers/42/notes.txt",
        "mine",
    );
    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));
    let token = token_for(42, Role::User);

    let response = get(
        router,
        "/find_file/generic/user_number/42?filename=notes.txt",
        Some(&token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_user_number_route_other_user_forbidden() {
    let root = data_root();
    write_file(
        root.path(),
        "GENERIC/autoreduce/UserNumbers/42/notes.txt",
        "mine",
    );
    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));
    let token = token_for(43, Role::User);

    let response = get(
        router,
        "/find_file/generic/user_number/42?filename=notes.txt",
        Some(&token),
    )
    .await;
    assert_error(response, StatusCode::FORBIDDEN, "forbidden").await;
}
