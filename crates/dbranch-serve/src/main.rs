//! dBranch Serve - HTTP API server for curated articles.
//!
//! This binary serves the article index and article bodies that the curator
//! daemon keeps in the content store, plus read-only ledger status when a
//! ledger database is configured.

use axum::http::{Method, Request};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use dbranch_serve::{AppState, Config, router};

/// dBranch article API server.
#[derive(Parser, Debug)]
#[command(name = "dbranch-serve")]
#[command(about = "HTTP API server for curated dBranch articles", long_about = None)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// Override the bind address from the environment.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load .env file if it exists; the curator's variables apply here too
    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dbranch_serve=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = Config::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let bind_addr = config.bind_addr.clone();

    // Create application state; neither backend has to be up yet
    let state = AppState::new(config)?;
    if !state.store.is_up().await {
        tracing::warn!(
            ipfs_host = %state.config.ipfs_host,
            "IPFS API not reachable yet; article requests will fail until it is"
        );
    }
    match &state.ledger {
        Some(ledger) => {
            if let Err(e) = ledger.source.ping().await {
                tracing::warn!(error = %e, "ledger database not reachable yet");
            }
            tracing::info!(addresses = ledger.addresses.len(), "ledger status endpoints enabled");
        }
        None => tracing::info!("no ledger database configured; /api/v0/db endpoints disabled"),
    }

    // Build router with middleware; the API is read-only
    let app = router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    query = request.uri().query().unwrap_or("")
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(Any),
        );

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "starting server");

    axum::serve(listener, app).await?;

    Ok(())
}
