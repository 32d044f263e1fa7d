//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::AppError;
use crate::server::handlers::{
    catalog_handler, create_machine_handler, delete_machine_handler, deploy_handler,
    deployment_status_handler, get_machine_handler, health_handler, list_machines_handler,
    reset_deployment_handler, select_handler, update_machine_handler, version_handler,
};
use crate::server::state::ServerState;

/// All routes, with state and middleware applied
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Machines
        .route(
            "/api/machines",
            get(list_machines_handler).post(create_machine_handler),
        )
        .route(
            "/api/machines/{id}",
            get(get_machine_handler)
                .patch(update_machine_handler)
                .delete(delete_machine_handler),
        )
        // Deployments
        .route("/api/deploy", post(deploy_handler))
        .route("/api/deployments/{id}", get(deployment_status_handler))
        .route("/api/deployments/{id}/reset", post(reset_deployment_handler))
        // Catalog and selection
        .route("/api/catalog", get(catalog_handler))
        .route("/api/select", post(select_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), AppError>>, AppError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| AppError::ServerError(e.to_string()))
    });

    Ok(handle)
}
