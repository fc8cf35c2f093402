use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use doc_rag::RagError;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "invalid_request",
            message: message.into(),
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let (status, error) = match &err {
            RagError::InvalidDocument(_) => (StatusCode::BAD_REQUEST, "invalid_document"),
            RagError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            RagError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_error"),
            RagError::Llm(_) => (StatusCode::BAD_GATEWAY, "llm_error"),
            RagError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            RagError::VectorStore(_) => (StatusCode::INTERNAL_SERVER_ERROR, "vector_store_error"),
            RagError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            RagError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        };

        Self {
            status,
            error,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        RagError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{} ({}): {}", self.error, self.status, self.message);
        } else {
            log::warn!("{} ({}): {}", self.error, self.status, self.message);
        }

        let body = Json(ErrorBody {
            error: self.error.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}
