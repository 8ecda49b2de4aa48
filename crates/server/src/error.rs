//! Server error types.

use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use slidecast_totp::TotpError;

/// Fatal errors while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("presenter code setup failed: {0}")]
    Totp(#[from] TotpError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("code generation failed: {0}")]
    Code(#[from] TotpError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::Code(err) => {
                tracing::error!(error = %err, "failed to compute presenter code");
                (StatusCode::INTERNAL_SERVER_ERROR, "CODE_UNAVAILABLE")
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
