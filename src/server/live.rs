//! Server-sent events for live instrument data.
//!
//! Clients subscribe to `GET /live-data/{instrument}` and receive a
//! `connected` event followed by one `file_changed` event per observed
//! change. Changes are detected by polling directory snapshots, which
//! keeps the transport working on network shares where inotify does
//! not.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
};
use futures::{ready, Stream};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tracing::{debug, warn};

use crate::fs::{diff_snapshots, snapshot_dir, FileSnapshot};

use super::handlers::{AppState, FileRouteError};

/// Lower bounds on client-supplied intervals, seconds. Values below
/// these are rejected rather than clamped.
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;
pub const MIN_KEEPALIVE_SECS: u64 = 5;

/// Defaults when the client supplies nothing.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_KEEPALIVE_SECS: u64 = 15;

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for the live-data subscription.
#[derive(Debug, Deserialize)]
pub struct LiveDataParams {
    /// Seconds between directory polls (min 1, default 2)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Seconds between SSE keepalive comments (min 5, default 15)
    #[serde(default = "default_keepalive")]
    pub keepalive_interval: u64,

    /// Bearer credential for transports that cannot set headers
    /// (consumed by the authorization layer)
    #[serde(default)]
    pub token: Option<String>,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_keepalive() -> u64 {
    DEFAULT_KEEPALIVE_SECS
}

/// Payload of the initial `connected` event.
#[derive(Debug, Serialize)]
struct ConnectedEvent {
    /// Watched directory, relative to the data root
    directory: String,
}

// =============================================================================
// Handler
// =============================================================================

/// Subscribe to file changes in an instrument's live-data directory.
///
/// # Endpoint
///
/// `GET /live-data/{instrument}?poll_interval=2&keepalive_interval=15`
///
/// # Events
///
/// - `connected`: emitted once, immediately, with the watched directory
///   relative to the data root
/// - `file_changed`: JSON `{"file": "...", "change_type": "added|deleted|modified"}`
///
/// Keepalive comments are sent on the configured cadence so proxies do
/// not drop idle connections.
///
/// # Errors
///
/// - `400 Bad Request`: an interval below its minimum
/// - `404 Not Found`: the instrument has no live-data directory
pub async fn live_data_handler(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
    Query(params): Query<LiveDataParams>,
) -> Result<Sse<KeepAliveStream<FileChangeStream>>, FileRouteError> {
    if params.poll_interval < MIN_POLL_INTERVAL_SECS {
        return Err(FileRouteError::IntervalTooSmall {
            what: "poll_interval",
            minimum: MIN_POLL_INTERVAL_SECS,
        });
    }
    if params.keepalive_interval < MIN_KEEPALIVE_SECS {
        return Err(FileRouteError::IntervalTooSmall {
            what: "keepalive_interval",
            minimum: MIN_KEEPALIVE_SECS,
        });
    }

    let production = state.production;
    let name = instrument.clone();
    let resolver = Arc::clone(&state.resolver);
    let dir = tokio::task::spawn_blocking(move || resolver.live_data_dir(&name, production))
        .await
        .map_err(|err| FileRouteError::Internal(err.to_string()))?
        .map_err(FileRouteError::from)?
        .ok_or(FileRouteError::UnknownInstrument {
            instrument: instrument.clone(),
        })?;

    let directory = state
        .resolver
        .guard()
        .relative(&dir)
        .map(|rel| rel.to_string_lossy().into_owned())
        .map_err(|err| FileRouteError::Internal(err.to_string()))?;

    let connected = Event::default()
        .event("connected")
        .json_data(&ConnectedEvent { directory })
        .map_err(|err| FileRouteError::Internal(err.to_string()))?;

    // Same rule as the lookup handlers: directory reads on a network
    // share go through the blocking pool
    let initial_dir = dir.clone();
    let initial = tokio::task::spawn_blocking(move || snapshot_dir(&initial_dir))
        .await
        .map_err(|err| FileRouteError::Internal(err.to_string()))?;

    let poll_interval = Duration::from_secs(params.poll_interval);
    let keepalive = Duration::from_secs(params.keepalive_interval);

    debug!(
        instrument = %instrument,
        dir = %dir.display(),
        poll_interval_secs = poll_interval.as_secs(),
        "live data subscription opened"
    );

    let stream = FileChangeStream::new(dir, connected, poll_interval, initial);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(keepalive)))
}

// =============================================================================
// Change Stream
// =============================================================================

/// SSE event stream backed by periodic directory snapshots.
///
/// Each poll tick dispatches a snapshot to the blocking pool, diffs the
/// result against the previous snapshot, and queues one event per
/// change. Files present in the initial snapshot produce no events. The
/// stream is dropped with the response on client disconnect, taking the
/// interval and any in-flight snapshot with it.
pub struct FileChangeStream {
    dir: PathBuf,
    interval: Interval,
    snapshot: FileSnapshot,
    in_flight: Option<JoinHandle<FileSnapshot>>,
    queued: VecDeque<Event>,
}

impl FileChangeStream {
    fn new(
        dir: PathBuf,
        connected: Event,
        poll_interval: Duration,
        initial: FileSnapshot,
    ) -> Self {
        let mut queued = VecDeque::new();
        queued.push_back(connected);

        // First poll fires one full interval from now, not immediately
        let interval =
            tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);

        Self {
            dir,
            interval,
            snapshot: initial,
            in_flight: None,
            queued,
        }
    }

    /// Diff a fresh snapshot against the previous one and queue the
    /// resulting events.
    fn queue_changes(&mut self, current: FileSnapshot) {
        for change in diff_snapshots(&self.snapshot, &current) {
            match Event::default().event("file_changed").json_data(&change) {
                Ok(event) => self.queued.push_back(event),
                Err(err) => warn!("failed to serialize file change event: {err}"),
            }
        }
        self.snapshot = current;
    }
}

impl Stream for FileChangeStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.queued.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            if let Some(handle) = this.in_flight.as_mut() {
                let joined = ready!(Pin::new(handle).poll(cx));
                this.in_flight = None;
                match joined {
                    Ok(current) => this.queue_changes(current),
                    Err(err) => warn!("directory snapshot task failed: {err}"),
                }
                continue;
            }

            ready!(this.interval.poll_tick(cx));
            let dir = this.dir.clone();
            this.in_flight = Some(tokio::task::spawn_blocking(move || snapshot_dir(&dir)));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
