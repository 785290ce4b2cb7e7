use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use desk_state::{SystemState, ThemeUpdate};

use super::ApiError;
use crate::AppState;

pub async fn get_state(State(state): State<AppState>) -> Json<SystemState> {
    let snapshot = state.desktop.state().await;
    Json(SystemState::clone(&snapshot.state))
}

pub async fn set_theme(
    State(state): State<AppState>,
    payload: Result<Json<ThemeUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let applied = state.desktop.set_theme(req.theme).await;
    Ok(Json(applied))
}
