//! HTTP server layer for the data gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /text/... /find_file/... /live-data/... /healthz        │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │  handlers   │  │     live     │  │        routes          │  │
//! │  │ (requests)  │  │ (SSE stream) │  │   (router + gate)      │  │
//! │  └─────────────┘  └──────────────┘  └────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Authorization lives in [`crate::auth`] and is applied here as a
//! single middleware layer over the whole router.

pub mod handlers;
pub mod live;
pub mod routes;

pub use handlers::{
    find_experiment_file_handler, find_instrument_file_handler, find_user_file_handler,
    healthz_handler, live_data_files_handler, text_file_handler, AppState, ErrorResponse,
    FileRouteError, FilenameParams, HEALTHY_FILE_PATH, HEALTHY_MARKER,
};
pub use live::{live_data_handler, FileChangeStream, LiveDataParams};
pub use routes::{create_router, RouterConfig};
