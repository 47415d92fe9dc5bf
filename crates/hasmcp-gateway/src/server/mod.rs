//! HTTP surface: routing, middleware, lifecycle.

mod api_routes;
mod auth;
mod mcp_routes;
mod oauth_routes;
mod state;
mod views;

pub use state::AppState;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use hasmcp_core::{MemQueue, ResourceChange};

pub struct GatewayServer {
    state: AppState,
    queue: Arc<MemQueue<ResourceChange>>,
}

impl GatewayServer {
    pub fn new(state: AppState, queue: Arc<MemQueue<ResourceChange>>) -> Self {
        Self { state, queue }
    }

    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let mcp_routes = Router::new()
            .route(
                "/mcp/{id}",
                axum::routing::post(mcp_routes::json_rpc)
                    .get(mcp_routes::stream)
                    .delete(mcp_routes::delete),
            )
            .route("/mcp/{id}/logs", get(mcp_routes::tail))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                auth::mcp_auth_middleware,
            ))
            .with_state(state.clone());

        let oauth_routes = Router::new()
            .route("/oauth2/authorize", get(oauth_routes::authorize))
            .route("/oauth2/callback", get(oauth_routes::callback))
            .with_state(state.clone());

        let api_routes = api_routes::router(state.clone()).layer(middleware::from_fn_with_state(
            state.clone(),
            auth::api_auth_middleware,
        ));

        let mut router = Router::new()
            .merge(mcp_routes)
            .merge(oauth_routes)
            .nest("/api/v1", api_routes)
            .layer(DefaultBodyLimit::max(state.cfg.server.max_body_size_in_bytes))
            .layer(TraceLayer::new_for_http());

        if state.cfg.server.cors_enabled {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        router
    }

    /// Serve until SIGINT, then let the change queue drain briefly.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("0.0.0.0:{}", self.state.cfg.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %addr, "gateway listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await?;

        self.queue.close();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        Ok(())
    }
}
