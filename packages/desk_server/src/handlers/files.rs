use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use desk_state::File;

use super::ApiError;
use crate::AppState;

pub async fn list_files(State(state): State<AppState>) -> Json<Vec<File>> {
    Json(state.desktop.files().await)
}

pub async fn create_file(
    State(state): State<AppState>,
    payload: Result<Json<File>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(file) = payload?;
    Ok(Json(state.desktop.create_file(file).await))
}

/// Persist the file's content, then update the matching in-memory entry.
pub async fn save_file(
    State(state): State<AppState>,
    payload: Result<Json<File>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(file) = payload?;
    let saved = state.desktop.save_file(file).await?;
    Ok(Json(saved))
}

/// Read saved content by name, independent of the in-memory file list.
pub async fn load_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let loaded = state.desktop.load_file(&name).await?;
    Ok(Json(loaded))
}
