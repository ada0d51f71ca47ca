use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::RagError;
use crate::chat::SessionError;

/// Error body returned by every JSON endpoint
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Rag(RagError),
}

impl From<RagError> for ApiError {
    #[inline]
    fn from(error: RagError) -> Self {
        Self::Rag(error)
    }
}

impl From<SessionError> for ApiError {
    #[inline]
    fn from(error: SessionError) -> Self {
        Self::Rag(RagError::Session(error))
    }
}

impl ApiError {
    #[inline]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Rag(error) => match error {
                RagError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
                RagError::Session(SessionError::SessionBusy(_))
                | RagError::Session(SessionError::NotGenerating(_)) => StatusCode::CONFLICT,
                RagError::Session(SessionError::EmptyMessage) => StatusCode::BAD_REQUEST,
                RagError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RagError::Generation(_) => StatusCode::BAD_GATEWAY,
                RagError::Embedding(_) | RagError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                RagError::Config(_) | RagError::Io(_) | RagError::Other(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Rag(error) => match error {
                RagError::Session(SessionError::NotFound(_)) => "SESSION_NOT_FOUND",
                RagError::Session(SessionError::SessionBusy(_)) => "SESSION_BUSY",
                RagError::Session(_) => "INVALID_TURN",
                RagError::Extraction(_) => "EXTRACTION_FAILED",
                RagError::Generation(_) => "GENERATION_FAILED",
                RagError::Embedding(_) => "EMBEDDING_FAILED",
                RagError::Store(_) => "STORE_UNAVAILABLE",
                RagError::Config(_) | RagError::Io(_) | RagError::Other(_) => "INTERNAL_ERROR",
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(message) => message.clone(),
            Self::Rag(error) => error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
            }
        }));

        (self.status(), body).into_response()
    }
}
