//! Datagate - a gateway for scientific instrument data.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use datagate::{
    auth::{EntitlementProvider, HttpEntitlementProvider, PermissionGate, Role, TokenAuthenticator},
    config::{CheckConfig, Cli, Command, ServeConfig, TokenConfig},
    fs::PathResolver,
    server::{create_router, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Token(config) => run_token(config),
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    info!("  Data root: {}", config.data_root.display());
    info!(
        "  Live data tree: {}",
        if config.production {
            "GENERIC (production)"
        } else {
            "GENERIC-staging"
        }
    );

    // Auth status with warning if disabled
    if config.dev_mode {
        warn!("  Auth: DISABLED - every file under the data root is publicly readable");
        warn!("        Remove --dev-mode / DATAGATE_DEV_MODE for production");
    } else {
        info!("  Auth: enabled");
        if let Some(ref url) = config.auth_api_url {
            info!("  Authorization service: {}", url);
        }
    }

    // Resolve and sandbox the data root up front; a missing or
    // unreadable root means nothing can be served
    let resolver = match PathResolver::new(&config.data_root) {
        Ok(resolver) => resolver,
        Err(e) => {
            error!(
                "Failed to open data root {}: {}",
                config.data_root.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    // Entitlement provider; dev mode never consults it, but the gate
    // still needs one to exist
    let entitlements = match HttpEntitlementProvider::new(
        config.auth_api_url.as_deref().unwrap_or("http://localhost"),
        config.auth_api_key.as_deref().unwrap_or(""),
    ) {
        Ok(provider) => provider,
        Err(e) => {
            error!("Failed to build authorization client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Only the inbound api_key is accepted from clients; the upstream
    // credential never is
    let gate = PermissionGate::new(
        TokenAuthenticator::new(config.auth_secret_or_empty()),
        entitlements,
        config.api_key.clone(),
    )
    .with_dev_mode(config.dev_mode);

    // Build router
    let router_config = build_router_config(&config);
    let router = create_router(resolver, gate, router_config);

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/healthz", addr);
    info!(
        "    curl -H 'Authorization: Bearer <token>' \\"
    );
    info!(
        "      'http://{}/find_file/instrument/MARI/experiment_number/1234?filename=run.nxspe'",
        addr
    );
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "datagate=debug,tower_http=debug"
    } else {
        "datagate=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::default()
        .with_production(config.production)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Token Command
// =============================================================================

fn run_token(config: TokenConfig) -> ExitCode {
    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let role = if config.role == "staff" {
        Role::Staff
    } else {
        Role::User
    };

    let authenticator = TokenAuthenticator::new(&config.secret);
    let token = authenticator.issue(config.user_number, role, Duration::from_secs(config.ttl));

    println!("{}", token);
    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    // Minimal logging for the check command
    if config.verbose {
        init_logging(true);
    }

    println!("Datagate Configuration Check");
    println!("════════════════════════════");
    println!();

    let mut failed = false;

    // Data root must canonicalize and be a directory
    match PathResolver::new(&config.data_root) {
        Ok(resolver) => {
            println!("✓ Data root: {}", resolver.root().display());
        }
        Err(e) => {
            println!("✗ Data root: {}", e);
            failed = true;
        }
    }

    // Authorization service reachability, if configured
    match (&config.auth_api_url, &config.auth_api_key) {
        (Some(url), Some(key)) => match HttpEntitlementProvider::new(url, key) {
            Ok(provider) => {
                let user_number = config.user_number.unwrap_or(0);
                match provider.experiments_for(user_number).await {
                    Ok(experiments) => {
                        println!(
                            "✓ Authorization service: {} ({} experiment(s) for user {})",
                            url,
                            experiments.len(),
                            user_number
                        );
                    }
                    Err(e) => {
                        println!("✗ Authorization service: {}", e);
                        failed = true;
                    }
                }
            }
            Err(e) => {
                println!("✗ Authorization service: {}", e);
                failed = true;
            }
        },
        _ => {
            println!("- Authorization service: not configured, skipping");
        }
    }

    println!();
    if failed {
        println!("Check failed.");
        ExitCode::FAILURE
    } else {
        println!("All checks passed.");
        ExitCode::SUCCESS
    }
}
