//! HTTP mapping of toolbox errors

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use maas_common::ErrorKind;

/// Result type for handlers
pub type Result<T> = std::result::Result<T, Error>;

/// Error type returned by handlers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure from a tier or workload operation
    #[error(transparent)]
    Toolbox(#[from] maas_common::Error),

    /// The request body could not be read as the expected JSON
    #[error("invalid request body: {0}")]
    BadRequest(String),
}

impl Error {
    /// Status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Toolbox(e) => match e.kind() {
                ErrorKind::Validation
                | ErrorKind::Immutability
                | ErrorKind::ReferentialIntegrity => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(e: JsonRejection) -> Self {
        Error::BadRequest(e.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = %status, error = %message, "Request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
