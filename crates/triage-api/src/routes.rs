//! Router setup with all API routes and middleware.

use std::future::Future;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use triage_core::error::{Result, TriageError};

use crate::handlers;
use crate::state::AppState;

/// Largest accepted submission body.
const SUBMIT_BODY_LIMIT: usize = 64 * 1024;

fn cors_layer(port: u16) -> CorsLayer {
    // The configured port plus port+1 for a dev server.
    let dev_port = port.saturating_add(1);
    let origins: Vec<HeaderValue> = [port, dev_port]
        .iter()
        .flat_map(|p| {
            [
                format!("http://127.0.0.1:{}", p),
                format!("http://localhost:{}", p),
            ]
        })
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.server.port);

    let api_routes = Router::new()
        .route(
            "/process",
            post(handlers::process).layer(DefaultBodyLimit::max(SUBMIT_BODY_LIMIT)),
        )
        .route("/status", get(handlers::status))
        .route("/events", get(handlers::events))
        .route(
            "/memory",
            get(handlers::get_memory).delete(handlers::clear_memory),
        )
        .route(
            "/agent/{method}",
            post(handlers::agent_call).layer(DefaultBodyLimit::max(SUBMIT_BODY_LIMIT)),
        );

    // Compression skips text/event-stream, so the event stream is unbuffered.
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` resolves.
///
/// On shutdown the event bus is closed first, which ends every open event
/// stream so the graceful drain can finish.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let bus = state.bus().clone();
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TriageError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Starting API server on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let closed = bus.close();
            info!(subscribers = closed, "Shutting down, event streams closed");
        })
        .await
        .map_err(|e| TriageError::Api(format!("Server error: {}", e)))?;

    info!("API server stopped");
    Ok(())
}
