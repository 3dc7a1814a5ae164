//! Router configuration for the data gateway.
//!
//! This module defines the HTTP routes and applies middleware for
//! authorization and CORS.
//!
//! # Route Structure
//!
//! ```text
//! /healthz                                                   - Health check (public)
//! /text/instrument/{instrument}/experiment_number/{n}        - Serve a text file (protected)
//! /find_file/instrument/{instrument}/experiment_number/{n}   - Locate a file (protected)
//! /find_file/generic/experiment_number/{n}                   - Locate a file (protected)
//! /find_file/generic/user_number/{n}                         - Locate a file (protected)
//! /live-data/{instrument}                                    - SSE change feed (public)
//! /live-data/{instrument}/files                              - List live files (public)
//! ```
//!
//! The authorization gate is one middleware layer over the whole
//! router; it decides per-path whether a request is open or protected,
//! so there is a single place where policy lives.
//!
//! # Example
//!
//! ```ignore
//! use datagate::auth::{HttpEntitlementProvider, PermissionGate, TokenAuthenticator};
//! use datagate::fs::PathResolver;
//! use datagate::server::{create_router, RouterConfig};
//!
//! let resolver = PathResolver::new("/mnt/ceph")?;
//! let entitlements = HttpEntitlementProvider::new("https://auth.example.com", "api-key")?;
//! let gate = PermissionGate::new(TokenAuthenticator::new("secret"), entitlements, None);
//!
//! let router = create_router(resolver, gate, RouterConfig::default());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{middleware, routing::get, Router};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{permission_middleware, EntitlementProvider, PermissionGate};
use crate::fs::PathResolver;

use super::handlers::{
    find_experiment_file_handler, find_instrument_file_handler, find_user_file_handler,
    healthz_handler, live_data_files_handler, text_file_handler, AppState,
};
use super::live::live_data_handler;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether live data is read from `GENERIC` (production) or
    /// `GENERIC-staging`
    pub production: bool,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None, // Allow any origin by default
            production: false,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    /// Pass None (or don't call this method) to allow any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Mark this deployment as production.
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Builds the complete Axum router with:
/// - File routes and health check
/// - The authorization gate applied over everything
/// - CORS configuration
/// - Request tracing (optional)
pub fn create_router<E>(
    resolver: PathResolver,
    gate: PermissionGate<E>,
    config: RouterConfig,
) -> Router
where
    E: EntitlementProvider + 'static,
{
    let app_state = AppState::new(resolver, config.production);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/healthz", get(healthz_handler))
        .route(
            "/text/instrument/{instrument}/experiment_number/{experiment_number}",
            get(text_file_handler),
        )
        .route(
            "/find_file/instrument/{instrument}/experiment_number/{experiment_number}",
            get(find_instrument_file_handler),
        )
        .route(
            "/find_file/generic/experiment_number/{experiment_number}",
            get(find_experiment_file_handler),
        )
        .route(
            "/find_file/generic/user_number/{user_number}",
            get(find_user_file_handler),
        )
        .route("/live-data/{instrument}", get(live_data_handler))
        .route("/live-data/{instrument}/files", get(live_data_files_handler))
        .with_state(app_state)
        .layer(middleware::from_fn_with_state(gate, permission_middleware::<E>))
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => {
            // No origins allowed - this effectively disables CORS
            cors
        }
        Some(origins) => {
            // Parse origins into HeaderValues
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
