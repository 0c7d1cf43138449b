use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::uploads::UploadStatus;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No upload with id {id}")]
    NotFound { id: String },

    #[error("Upload {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: UploadStatus,
        to: UploadStatus,
    },

    #[error("File type not accepted: {name} ({mime_type})")]
    UnsupportedType { name: String, mime_type: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Path outside the selectable root: {path}")]
    OutsideRoot { path: String },

    #[error("Could not get signed URL: {reason}")]
    SignedUrl { reason: String },

    #[error("Storage rejected upload with status {status}")]
    PutRejected { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::FileNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::SignedUrl { .. } | Self::PutRejected { .. } | Self::Network(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::OutsideRoot { .. } => StatusCode::FORBIDDEN,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Covers 413 for drops over the body limit.
            Self::Multipart(e) => e.status(),
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
