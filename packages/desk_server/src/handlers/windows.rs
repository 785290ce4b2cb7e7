use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use desk_state::Window;

use super::ApiError;
use crate::AppState;

pub async fn create_window(
    State(state): State<AppState>,
    payload: Result<Json<Window>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(window) = payload?;
    Ok(Json(state.desktop.create_window(window).await))
}

/// Replace the window with `id`. Unknown ids succeed without changing anything.
pub async fn update_window(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Window>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(window) = payload?;
    Ok(Json(state.desktop.update_window(&id, window).await))
}

pub async fn delete_window(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.desktop.delete_window(&id).await;
    StatusCode::NO_CONTENT
}
