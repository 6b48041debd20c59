use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug)]
pub enum Error {
    /// A malformed or semantically invalid request (HTTP 400).
    BadRequest(String),
    /// The requested data is not known (HTTP 404).
    NotFound(String),
    /// An unexpected internal failure (HTTP 500).
    ServerError(String),
    /// The message failed the selected broadcast validation (HTTP 400).
    BroadcastValidationFailed(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadRequest(message) => write!(f, "Bad Request: {message}"),
            Error::NotFound(message) => write!(f, "Not Found: {message}"),
            Error::ServerError(message) => write!(f, "Server Error: {message}"),
            Error::BroadcastValidationFailed(message) => {
                write!(f, "Broadcast Validation Failed: {message}")
            }
        }
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::BroadcastValidationFailed(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let body = Json(json!({
            "code": code.as_u16(),
            "message": self.to_string(),
            "stacktraces": [],
        }));
        (code, body).into_response()
    }
}
