use axum::{
    Json,
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::debug;

pub type AppResult<T> = Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// url parameter missing or not an absolute http(s) url
    #[error("{0}")]
    InvalidUrl(String),

    /// dns, connect, tls, timeout or body read failures talking to the target
    #[error("upstream unreachable: {details}")]
    UpstreamUnreachable { url: String, details: String },

    /// the target answered with a non-2xx status, which we mirror back. the body is kept as the
    /// upstream sent it for logging, the player only ever sees the json
    #[error("upstream responded with {status}")]
    UpstreamError {
        url: String,
        status: StatusCode,
        details: String,
        body: Bytes,
    },

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamUnreachable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::UpstreamError { status, .. } => *status,
            Error::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let status = Some(self.status_code().as_u16());

        match self {
            Error::InvalidUrl(message) => ErrorBody {
                error: message.clone(),
                status,
                url: None,
                details: None,
            },
            Error::UpstreamUnreachable { url, details } => ErrorBody {
                error: "Failed to reach upstream".to_string(),
                status,
                url: Some(url.clone()),
                details: Some(details.clone()),
            },
            Error::UpstreamError {
                url,
                status: upstream,
                details,
                ..
            } => ErrorBody {
                error: format!("Upstream responded with {}", upstream.as_u16()),
                status,
                url: Some(url.clone()),
                details: Some(details.clone()),
            },
            Error::InternalServerErrorWithContext(message) => ErrorBody {
                error: "Internal server error".to_string(),
                status,
                url: None,
                details: Some(message.clone()),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        debug!("Responding with error: {}", self);
        (self.status_code(), Json(self.body())).into_response()
    }
}
