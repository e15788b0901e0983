use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Body returned for every accepted event, whatever happened downstream.
pub const ACCEPTED_BODY: &str = "ok";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AcceptError {
    #[error("id parameter is required")]
    MissingId,
}

impl IntoResponse for AcceptError {
    fn into_response(self) -> Response {
        match self {
            AcceptError::MissingId => (StatusCode::BAD_REQUEST, self.to_string()),
        }
        .into_response()
    }
}
