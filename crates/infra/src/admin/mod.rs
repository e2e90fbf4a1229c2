//! Operator surface for the admission queue
//!
//! - `GET /stats` returns the [`StatsReport`](apiguard_domain::StatsReport)
//! - `POST /admin` executes an [`AdminAction`]
//!
//! The router carries no authentication; mount it behind whatever guards
//! the host service already applies to internal endpoints.

pub mod handlers;
pub mod service;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

pub use self::service::{AdminAction, AdminError, AdminResponse, AdminService};
use self::handlers::{get_stats, post_admin};

pub fn setup_admin_router(service: AdminService) -> Router {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/admin", post(post_admin))
        .with_state(service)
}

/// Serve the admin router until the listener fails.
pub async fn serve(listener: TcpListener, service: AdminService) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Admin surface listening");
    }
    axum::serve(listener, setup_admin_router(service)).await
}
