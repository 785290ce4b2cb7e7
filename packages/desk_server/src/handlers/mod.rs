pub mod files;
pub mod health;
pub mod state;
pub mod websocket;
pub mod windows;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use desk_state::DeskError;
use tracing::{error, warn};

use crate::AppState;

// Re-export all handlers for easy route registration
pub use files::{create_file, list_files, load_file, save_file};
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use state::{get_state, set_theme};
pub use websocket::websocket_handler;
pub use windows::{create_window, delete_window, update_window};

/// Every API and subscriber route, without middleware.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/windows", post(create_window))
        .route(
            "/api/windows/{id}",
            put(update_window).delete(delete_window),
        )
        .route("/api/files", get(list_files).post(create_file))
        .route("/api/files/save", post(save_file))
        .route("/api/files/{name}/content", get(load_file))
        .route("/api/theme", put(set_theme))
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(health_live_handler))
        .route("/metrics", get(metrics_handler))
}

/// Handler error: a desktop error rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(DeskError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DeskError::Validation { .. } => StatusCode::BAD_REQUEST,
            DeskError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            DeskError::Persistence { .. } | DeskError::Read { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DeskError> for ApiError {
    fn from(err: DeskError) -> Self {
        ApiError(err)
    }
}

/// Undecodable request bodies are validation errors.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(DeskError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(DeskError::validation("x")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DeskError::FileNotFound {
                name: "a".to_string()
            })
            .status(),
            StatusCode::NOT_FOUND
        );
        let io = std::io::Error::other("disk full");
        assert_eq!(
            ApiError::from(DeskError::Persistence {
                name: "a".to_string(),
                source: desk_state::BlobError::Io {
                    name: "a".to_string(),
                    source: io,
                },
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let resp = ApiError::from(DeskError::validation("bad name")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid input: bad name");
    }
}
