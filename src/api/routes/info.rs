//! Metadata lookup handler.

use super::InfoRequest;
use crate::api::AppState;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};

/// POST /info - Title, duration, thumbnail and download options for a URL
pub async fn get_info(
    State(state): State<AppState>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ApiError::validation(rejection.body_text()).into_response(),
    };

    match state.downloader.get_info(&request.url).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => {
            tracing::debug!(url = %request.url, error = %e, "info lookup failed");
            e.into_response()
        }
    }
}
