//! Configuration management for the data gateway.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `DATAGATE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use datagate::config::Cli;
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! ```
//!
//! # Environment Variables
//!
//! All serve options can be set via environment variables with the
//! `DATAGATE_` prefix:
//!
//! - `DATAGATE_HOST` - Server bind address (default: 0.0.0.0)
//! - `DATAGATE_PORT` - Server port (default: 8000)
//! - `DATAGATE_DATA_ROOT` - Root of the shared data filesystem (required)
//! - `DATAGATE_AUTH_SECRET` - HMAC secret for JWT verification
//! - `DATAGATE_AUTH_API_URL` - Base URL of the authorization service
//! - `DATAGATE_AUTH_API_KEY` - Credential this gateway sends to the
//!   authorization service
//! - `DATAGATE_API_KEY` - Static API key accepted as an inbound bearer
//!   credential from trusted services (optional)
//! - `DATAGATE_DEV_MODE` - Disable authorization entirely (default: false)
//! - `DATAGATE_PRODUCTION` - Read live data from `GENERIC` instead of
//!   `GENERIC-staging` (default: false)
//! - `DATAGATE_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default token lifetime in seconds (1 hour).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

// =============================================================================
// CLI
// =============================================================================

/// Data gateway - serves scientific instrument data from a shared
/// filesystem, gated by per-experiment authorization.
#[derive(Parser, Debug)]
#[command(name = "datagate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server
    Serve(ServeConfig),

    /// Issue a signed bearer token for testing
    Token(TokenConfig),

    /// Check configuration and connectivity without serving
    Check(CheckConfig),
}

// =============================================================================
// Serve Configuration
// =============================================================================

/// Configuration for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "DATAGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "DATAGATE_PORT")]
    pub port: u16,

    // =========================================================================
    // Filesystem Configuration
    // =========================================================================
    /// Root directory of the shared data filesystem.
    ///
    /// Every served file must live under this directory; requests that
    /// resolve outside it are rejected.
    #[arg(long, env = "DATAGATE_DATA_ROOT")]
    pub data_root: PathBuf,

    /// Serve live data from the production tree (`GENERIC`) instead of
    /// `GENERIC-staging`.
    #[arg(long, default_value_t = false, env = "DATAGATE_PRODUCTION")]
    pub production: bool,

    // =========================================================================
    // Authorization Configuration
    // =========================================================================
    /// Secret key for JWT (HMAC-SHA256) verification.
    ///
    /// Required unless --dev-mode is set.
    #[arg(long, env = "DATAGATE_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    /// Base URL of the authorization service used for entitlement
    /// lookups.
    #[arg(long, env = "DATAGATE_AUTH_API_URL")]
    pub auth_api_url: Option<String>,

    /// API key this gateway sends to the authorization service.
    #[arg(long, env = "DATAGATE_AUTH_API_KEY")]
    pub auth_api_key: Option<String>,

    /// Static API key accepted verbatim as an inbound bearer credential
    /// from trusted services.
    ///
    /// Distinct from --auth-api-key: that credential is sent upstream
    /// and is never accepted from clients. Leave unset to disable the
    /// bypass.
    #[arg(long, env = "DATAGATE_API_KEY")]
    pub api_key: Option<String>,

    /// Disable authorization entirely.
    ///
    /// WARNING: Only use in development/testing; every file under the
    /// data root becomes readable by anyone who can reach the server.
    #[arg(long, default_value_t = false, env = "DATAGATE_DEV_MODE")]
    pub dev_mode: bool,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "DATAGATE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.data_root.as_os_str().is_empty() {
            return Err(
                "Data root is required. Set --data-root or DATAGATE_DATA_ROOT".to_string(),
            );
        }

        if self.dev_mode {
            return Ok(());
        }

        // With the gate enabled, every credential source must be set
        if self.auth_secret.as_deref().unwrap_or("").is_empty() {
            return Err(
                "Authorization is enabled but no secret provided. \
                 Set --auth-secret or DATAGATE_AUTH_SECRET, or disable with --dev-mode"
                    .to_string(),
            );
        }
        if self.auth_api_url.as_deref().unwrap_or("").is_empty() {
            return Err(
                "Authorization service URL is required. \
                 Set --auth-api-url or DATAGATE_AUTH_API_URL, or disable with --dev-mode"
                    .to_string(),
            );
        }
        if self.auth_api_key.as_deref().unwrap_or("").is_empty() {
            return Err(
                "Authorization service API key is required. \
                 Set --auth-api-key or DATAGATE_AUTH_API_KEY, or disable with --dev-mode"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the auth secret, empty if not set (call validate() first).
    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Token Configuration
// =============================================================================

/// Configuration for the `token` subcommand.
#[derive(Args, Debug, Clone)]
pub struct TokenConfig {
    /// Secret key the server verifies tokens with.
    #[arg(long, env = "DATAGATE_AUTH_SECRET")]
    pub secret: String,

    /// User number to embed in the token.
    #[arg(long)]
    pub user_number: u32,

    /// Role to embed in the token ("user" or "staff").
    #[arg(long, default_value = "user")]
    pub role: String,

    /// Token lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    pub ttl: u64,
}

impl TokenConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret must not be empty".to_string());
        }
        if self.role != "user" && self.role != "staff" {
            return Err(format!("Unknown role: {} (expected user or staff)", self.role));
        }
        if self.ttl == 0 {
            return Err("ttl must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Check Configuration
// =============================================================================

/// Configuration for the `check` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Root directory of the shared data filesystem.
    #[arg(long, env = "DATAGATE_DATA_ROOT")]
    pub data_root: PathBuf,

    /// Base URL of the authorization service.
    #[arg(long, env = "DATAGATE_AUTH_API_URL")]
    pub auth_api_url: Option<String>,

    /// API key for the authorization service.
    #[arg(long, env = "DATAGATE_AUTH_API_KEY")]
    pub auth_api_key: Option<String>,

    /// User number to probe entitlements for.
    #[arg(long)]
    pub user_number: Option<u32>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
