//! SSE live-data integration tests.
//!
//! Exercises the change feed end to end: subscribe, observe the
//! connected handshake, then mutate the watched directory and read the
//! resulting events off the response body stream.

use std::fs;
use std::time::Duration;

use axum::http::StatusCode;
use futures::StreamExt;

use super::test_utils::{assert_error, data_root, get, router_for, write_file, MockEntitlements};

/// Read body chunks until `needle` appears, or the timeout elapses.
async fn read_until(
    body: &mut (impl futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin),
    needle: &str,
    buffer: &mut String,
) {
    let deadline = Duration::from_secs(10);
    let result = tokio::time::timeout(deadline, async {
        while !buffer.contains(needle) {
            match body.next().await {
                Some(Ok(chunk)) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Some(Err(err)) => panic!("body stream error: {err}"),
                None => panic!("body stream ended before {needle:?} (got: {buffer})"),
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {needle:?} (got: {buffer})");
}

#[tokio::test]
async fn test_subscription_starts_with_connected_event() {
    let root = data_root();
    write_file(root.path(), "GENERIC-staging/livereduce/MARI/seed.nxs", "");
    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));

    let response = get(router, "/live-data/MARI?poll_interval=1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut body = response.into_body().into_data_stream();
    let mut buffer = String::new();
    read_until(&mut body, "event: connected", &mut buffer).await;
    assert!(
        buffer.contains("GENERIC-staging/livereduce/MARI"),
        "connected event should carry the watched directory, got: {buffer}"
    );
}

#[tokio::test]
async fn test_added_and_deleted_files_stream_events() {
    let root = data_root();
    let live_dir = root.path().join("GENERIC-staging/livereduce/MARI");
    fs::create_dir_all(&live_dir).unwrap();

    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));
    let response = get(router, "/live-data/MARI?poll_interval=1", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let mut buffer = String::new();
    read_until(&mut body, "event: connected", &mut buffer).await;

    // A new file must produce an "added" event on a later poll
    fs::write(live_dir.join("run001.nxs"), b"data").unwrap();
    read_until(&mut body, "\"change_type\":\"added\"", &mut buffer).await;
    assert!(buffer.contains("run001.nxs"), "got: {buffer}");

    // Removing it must produce a "deleted" event
    fs::remove_file(live_dir.join("run001.nxs")).unwrap();
    read_until(&mut body, "\"change_type\":\"deleted\"", &mut buffer).await;
}

#[tokio::test]
async fn test_subscription_to_unknown_instrument_fails() {
    let root = data_root();
    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));

    let response = get(router, "/live-data/NONEXISTENT?poll_interval=1", None).await;
    assert_error(response, StatusCode::NOT_FOUND, "not_found").await;
}

#[tokio::test]
async fn test_out_of_range_intervals_rejected() {
    let root = data_root();
    write_file(root.path(), "GENERIC-staging/livereduce/MARI/seed.nxs", "");
    let router = router_for(root.path(), MockEntitlements::allowing(Vec::new()));

    let response = get(router.clone(), "/live-data/MARI?poll_interval=0", None).await;
    assert_error(response, StatusCode::BAD_REQUEST, "invalid_interval").await;

    let response = get(router, "/live-data/MARI?keepalive_interval=2", None).await;
    assert_error(response, StatusCode::BAD_REQUEST, "invalid_interval").await;
}

#[tokio::test]
async fn test_production_flag_switches_tree() {
    use datagate::auth::{PermissionGate, TokenAuthenticator};
    use datagate::fs::PathResolver;
    use datagate::server::{create_router, RouterConfig};

    let root = data_root();
    write_file(root.path(), "GENERIC/livereduce/MARI/prod.nxs", "");

    let resolver = PathResolver::new(root.path()).unwrap();
    let gate = PermissionGate::new(
        TokenAuthenticator::new("secret"),
        MockEntitlements::allowing(Vec::new()),
        None,
    );
    let router = create_router(
        resolver,
        gate,
        RouterConfig::default()
            .with_production(true)
            .with_tracing(false),
    );

    let response = get(router, "/live-data/MARI/files", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}
