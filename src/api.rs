//! Small HTTP endpoints next to the websocket route.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::session;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Resolve the calling user's avatar URL through the configured provider.
///
/// GET /avatar
pub async fn avatar_url(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user = session::user_data_from_headers(&headers);
    match state.avatar.resolve(&user) {
        Ok(url) => (StatusCode::OK, Json(AvatarResponse { url })).into_response(),
        Err(e) => {
            tracing::debug!(name = %user.name(), "avatar resolution failed: {}", e);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
