use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use tax_core::calculations::AssessmentCalculator;
use tax_core::db::{MemoryRepositoryFactory, RepositoryRegistry};
use tax_core::records::RecordService;
use tax_db_sqlite::SqliteRepositoryFactory;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::config::AppConfig;
use crate::routes;

#[derive(Clone)]
pub struct AppState {
    pub records: RecordService,
}

impl AppState {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }
}

/// Every storage backend this binary can open.
pub fn build_registry() -> RepositoryRegistry {
    let mut registry = RepositoryRegistry::new();
    registry.register(Box::new(SqliteRepositoryFactory));
    registry.register(Box::new(MemoryRepositoryFactory));
    registry
}

/// Opens the configured repository and builds the calculator.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let calculator = AssessmentCalculator::new(config.assessment)
        .context("Invalid [assessment] configuration")?;

    let repo = build_registry()
        .create(&config.database)
        .await
        .with_context(|| format!("Failed to open {} database", config.database.backend))?;

    info!(
        backend = %config.database.backend,
        tax_policy = calculator.config().tax_policy.kind(),
        "storage and calculator ready"
    );
    Ok(AppState::new(RecordService::new(Arc::from(repo), calculator)))
}

pub fn build_router(state: AppState) -> Router {
    // the browser client is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health_check))
        .route(
            "/api/taxpayers",
            get(routes::list_taxpayers).post(routes::create_taxpayer),
        )
        .route(
            "/api/taxpayers/:payer_id",
            get(routes::get_taxpayer)
                .put(routes::update_taxpayer)
                .delete(routes::delete_taxpayer),
        )
        .route(
            "/api/assessments",
            get(routes::list_assessments).post(routes::create_assessment),
        )
        .route("/api/assessments/preview", post(routes::preview_assessment))
        .route(
            "/api/assessments/:assessment_id",
            get(routes::get_assessment)
                .put(routes::update_assessment)
                .delete(routes::delete_assessment),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Serves the API until Ctrl+C or SIGTERM.
pub async fn run(config: AppConfig) -> Result<()> {
    let addr = config.socket_addr()?;
    let state = build_state(&config).await?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}
