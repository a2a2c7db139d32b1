use reqwest::StatusCode;

use crate::http_server::api::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("access token is not a valid header value")]
    InvalidToken,
    #[error("{} ({}): {}", .1.error_code, .0, .1.message)]
    Rejected(StatusCode, ErrorBody),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}
