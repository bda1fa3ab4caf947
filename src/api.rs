use axum::{
    extract::Query,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tower_http::cors::{CorsLayer, Any};

use crate::config::Config;
use crate::state::SharedState;

const DEFAULT_LIMIT: usize = 20;

#[derive(Deserialize)]
pub struct FindingsQuery {
    pub limit: Option<usize>, // defaults to 20
}

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Asset drain monitor running" }))
        .route("/findings", get({
            let state = Arc::clone(&state);
            move |q: Query<FindingsQuery>| {
                let state = Arc::clone(&state);
                async move { Json(state.recent(q.limit.unwrap_or(DEFAULT_LIMIT))) }
            }
        }))
        .route("/status", get({
            let state = Arc::clone(&state);
            move || {
                let state = Arc::clone(&state);
                async move { Json(state.status()) }
            }
        }))
        .layer(cors)
}

pub async fn serve(cfg: Config, state: SharedState) -> eyre::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
