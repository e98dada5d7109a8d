//! HTTP client for the dagship platform API.

pub mod error;
pub mod http;

pub use error::ClientError;
pub use http::{HttpPlatform, api_base_url};
