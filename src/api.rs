use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::task::{self, JoinError};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::models::{CheckResult, Monitor};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("query task failed: {0}")]
    Join(#[from] JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "api query failed");
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

// rusqlite blocks on the connection mutex, keep it off the runtime threads
async fn query<T, F>(store: Store, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
{
    Ok(task::spawn_blocking(move || f(&store)).await??)
}

pub async fn get_monitors(State(store): State<Store>) -> Result<Json<Vec<Monitor>>, ApiError> {
    Ok(Json(query(store, |s| s.get_monitors()).await?))
}

pub async fn get_results(
    State(store): State<Store>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CheckResult>>, ApiError> {
    Ok(Json(query(store, move |s| s.get_results(id)).await?))
}

pub fn create_router(store: Store) -> Router {
    let v1 = Router::new()
        .route("/monitors", get(get_monitors))
        .route("/results/{id}", get(get_results));

    Router::new()
        .nest("/api/v1", v1)
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub async fn start_server(port: u16, store: Store) -> anyhow::Result<()> {
    let app = create_router(store);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API: http://localhost:{}/api/v1/monitors", addr.port());
    axum::serve(listener, app).await?;
    Ok(())
}
