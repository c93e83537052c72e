//! Mapping engine errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use vitrum_core::VitrumError;

/// Wrapper that turns a [`VitrumError`] into an HTTP response.
pub struct ApiError(pub VitrumError);

impl From<VitrumError> for ApiError {
    fn from(err: VitrumError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Internal details stay in the logs.
            tracing::error!("internal error: {}", self.0);
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = Json(json!({
            "error": self.0.kind(),
            "message": message,
        }));
        (status, body).into_response()
    }
}

fn status_for(err: &VitrumError) -> StatusCode {
    match err {
        VitrumError::BadRequest(_) => StatusCode::BAD_REQUEST,
        VitrumError::NotFound(_) => StatusCode::NOT_FOUND,
        VitrumError::Forbidden(_) => StatusCode::FORBIDDEN,
        VitrumError::PeerOffline(_) => StatusCode::NOT_FOUND,
        VitrumError::PeerTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        VitrumError::PeerUpstream { status } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        VitrumError::PeerRequest(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Shorthand for handler results.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&VitrumError::BadRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&VitrumError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&VitrumError::PeerOffline("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&VitrumError::PeerTimeout { secs: 5 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&VitrumError::PeerUpstream { status: 503 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&VitrumError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
