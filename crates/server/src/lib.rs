//! HTTP surface of the progress tracker.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use services::AppServices;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error;
pub mod routes;

pub use auth::{AuthUser, Authenticator, StaticTokens};
pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub services: AppServices,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    #[must_use]
    pub fn new(services: AppServices, auth: Arc<dyn Authenticator>) -> Self {
        Self { services, auth }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/roadmap-progress",
            get(routes::roadmap::snapshot).put(routes::roadmap::save_snapshot),
        )
        .route(
            "/roadmap-progress/:role_id",
            axum::routing::delete(routes::roadmap::reset_role),
        )
        .route("/roadmap-progress/:role_id/:year_id", get(routes::roadmap::year))
        .route(
            "/roadmap-progress/:role_id/:year_id/:item_type/:item_index",
            axum::routing::put(routes::roadmap::update_item),
        )
        .route("/progress/:user_id", get(routes::skills::list))
        .route(
            "/progress/:user_id/:role_id",
            axum::routing::delete(routes::skills::reset_role),
        )
        .route("/progress/:user_id/:role_id/:year_id", get(routes::skills::list_year))
        .route(
            "/progress/:user_id/:role_id/:year_id/:skill_name/:sub_skill_name",
            get(routes::skills::sub_skill).put(routes::skills::update_sub_skill),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns the underlying IO error if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "progress server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
