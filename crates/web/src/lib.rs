//! Browser-facing surface: the playground page, static assets, a health
//! endpoint, and the playground WebSocket.
//!
//! [`build_app`] assembles the router from an [`AppState`] and is shared by
//! production startup and the integration tests; [`start_server`] binds and
//! serves it with graceful shutdown.

pub mod assets;
pub mod page;
pub mod ws;

use std::sync::Arc;

use {
    axum::{Json, Router, extract::State, response::IntoResponse, routing::get},
    sandpit_playground::Playground,
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub playground: Arc<Playground>,
}

// ── Router / server ──────────────────────────────────────────────────────────

/// Build the playground router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(page::playground_page_handler))
        .route("/health", get(health_handler))
        .route("/api/playground/ws", get(ws::playground_ws_upgrade_handler))
        .route(
            "/assets/v/{version}/{*path}",
            get(assets::versioned_asset_handler),
        )
        .route("/assets/{*path}", get(assets::asset_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the playground until ctrl-c.
pub async fn start_server(
    bind: &str,
    port: u16,
    playground: Arc<Playground>,
) -> anyhow::Result<()> {
    let app = build_app(AppState { playground });
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "playground listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "phase": state.playground.phase(),
    }))
}
