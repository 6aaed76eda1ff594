//! Application startup and lifecycle management.

use crate::config::ReportServiceConfig;
use crate::handlers::{downloads, health, reports};
use crate::services::metrics::init_metrics;
use crate::services::{BatchRegistry, Database, ReportDownloader, ReportProcessor};
use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ReportServiceConfig,
    pub db: Arc<Database>,
    pub registry: BatchRegistry,
    pub downloader: Arc<ReportDownloader>,
    pub processor: ReportProcessor,
}

impl AppState {
    pub fn new(config: ReportServiceConfig, db: Arc<Database>) -> Self {
        let registry = BatchRegistry::new(config.bulk.status_ttl);
        let downloader = Arc::new(ReportDownloader::new(config.report_generator.clone()));
        let processor = ReportProcessor::new(db.clone(), config.ingestion.clone());
        Self {
            config,
            db,
            registry,
            downloader,
            processor,
        }
    }
}

async fn not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Route not found"))
}

/// Build the HTTP router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route("/api/test", get(reports::source_report_groups))
        .route(
            "/api/process-single-report",
            post(reports::process_single_report),
        )
        .route(
            "/api/process-bulk-reports",
            post(reports::process_bulk_reports),
        )
        .route("/api/bulk-status/:batch_id", get(reports::bulk_status))
        .route(
            "/api/process-all-reports",
            post(reports::process_all_reports),
        )
        .route("/api/report-mappings", get(reports::report_mappings))
        .route("/api/reports", get(reports::list_reports))
        .route("/api/reports/compare", get(reports::compare_reports))
        .route("/api/reportSummary", get(reports::report_summary))
        .route("/api/download-report", post(downloads::download_report))
        .route(
            "/api/download-bulk-reports",
            post(downloads::download_bulk_reports),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ReportServiceConfig) -> Result<Self, AppError> {
        let run_migrations = config.database.run_migrations;
        Self::build_internal(config, run_migrations).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: ReportServiceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: ReportServiceConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let state = AppState::new(config.clone(), Arc::new(db));

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Loan report service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let _sweeper = self
            .state
            .registry
            .spawn_sweeper(self.state.config.bulk.sweep_interval);

        let router = build_router(self.state);

        tracing::info!(
            service = "loan-report-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
