use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::action::Move;
use crate::api::{
    ApiError, ApplyMoveRequest, ConfigRequest, ConfigResponse, DatasetRequest, DatasetResponse, OptimizeRequest,
    SolutionId, SolutionView, Workspace,
};
use crate::config::ServerConfig;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(event = "request_failed", error = %self);
        }
        (status, Json(self.body())).into_response()
    }
}

pub fn router(workspace: Arc<Workspace>) -> Router {
    Router::new()
        .route("/dataset", post(create_dataset))
        .route("/config", post(create_config))
        .route("/optimize", post(run_optimize))
        .route("/solution/{solution_id}", get(get_solution))
        .route("/solution/{solution_id}/apply-move", post(apply_move))
        .route("/solution/{solution_id}/moves", get(list_moves))
        .with_state(workspace)
}

pub fn cors(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::POST]).allow_headers(Any);
    match config.cors_origin.as_deref().and_then(|origin| HeaderValue::from_str(origin).ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}

async fn create_dataset(
    State(workspace): State<Arc<Workspace>>,
    Json(request): Json<DatasetRequest>,
) -> Result<Json<DatasetResponse>, ApiError> {
    workspace.register_dataset(request).map(Json)
}

async fn create_config(
    State(workspace): State<Arc<Workspace>>,
    Json(request): Json<ConfigRequest>,
) -> Result<Json<ConfigResponse>, ApiError> {
    workspace.save_config(request).map(Json)
}

/// The search is CPU bound, so it runs on the blocking pool.
async fn run_optimize(
    State(workspace): State<Arc<Workspace>>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<SolutionView>, ApiError> {
    tokio::task::spawn_blocking(move || workspace.optimize(request))
        .await
        .map_err(|err| ApiError::Internal(format!("optimizer task failed: {err}")))?
        .map(Json)
}

async fn get_solution(
    State(workspace): State<Arc<Workspace>>,
    Path(solution_id): Path<SolutionId>,
) -> Result<Json<SolutionView>, ApiError> {
    workspace.solution(solution_id).map(Json)
}

async fn apply_move(
    State(workspace): State<Arc<Workspace>>,
    Path(solution_id): Path<SolutionId>,
    Json(request): Json<ApplyMoveRequest>,
) -> Result<Json<SolutionView>, ApiError> {
    workspace.apply_move(solution_id, request).map(Json)
}

async fn list_moves(
    State(workspace): State<Arc<Workspace>>,
    Path(solution_id): Path<SolutionId>,
) -> Result<Json<Vec<Move>>, ApiError> {
    workspace.moves(solution_id).map(Json)
}
