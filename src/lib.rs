//! Async client for OpenRouter-compatible chat completion APIs.
//!
//! A call flows through [`builder`] → [`headers`] → [`retry`] → [`executor`] →
//! [`classify`] → [`decode`]. Transport is pluggable through [`http::HttpTransport`];
//! [`http::reqwest::ReqwestTransport`] is the default.

pub mod builder;
pub mod classify;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod headers;
pub mod http;
pub mod models;
pub mod retry;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::OpenRouterClient;
pub use config::ClientConfig;
pub use error::{ApiError, OpenRouterError, Result};
pub use models::{ModelCatalog, ModelSupport};
pub use retry::RetryConfig;
pub use tokio_util::sync::CancellationToken;
pub use types::*;
