//! Typed HTTP client for the relay API, used by the CLI.

mod client;
mod error;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

pub use client::ApiClient;
pub use error::ApiError;

/// A request type that knows which route serves it and what comes back
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError>;
}
