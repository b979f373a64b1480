//! # Sitedeck Node
//!
//! HTTP control plane for static sites, each backed by its own stack.

use std::sync::Arc;

use axum::{
    routing::{get, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod orchestrator;
mod state;

use config::Config;
use orchestrator::Orchestrator;
use sitedeck_workspace::LocalWorkspace;
use state::AppState;

/// Run the Sitedeck node server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    info!(
        project = %config.project,
        region = %config.region,
        state_dir = ?config.state_dir,
        "Sitedeck node starting"
    );

    let workspace = LocalWorkspace::open(config.workspace()).await?;
    let orchestrator = Orchestrator::new(Arc::new(workspace), &config.project, &config.region);
    let app = create_router(AppState::new(orchestrator));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Sitedeck node stopped");
    Ok(())
}

/// Create the API router.
pub(crate) fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health::health_check))
        .route(
            "/api/sites",
            get(api::sites::list_sites).post(api::sites::create_site),
        )
        .route("/api/sites/:id", site_routes())
        .route("/api/stacks", get(api::stacks::list_stacks))
        .route("/api/stacks/:id", site_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Per-site routes, served under both `/api/sites/:id` and `/api/stacks/:id`.
fn site_routes() -> MethodRouter<AppState> {
    get(api::sites::get_site)
        .put(api::sites::update_site)
        .delete(api::sites::delete_site)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("sitedeck_node=info,sitedeck_workspace=info,tower_http=info")
        }))
        .init();

    run_server(Config::load()?).await
}
