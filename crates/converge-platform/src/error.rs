//! Platform error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("API token is not configured (set {0})")]
    MissingToken(&'static str),

    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] converge_config::ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] converge_cloud::ClientError),
}

pub type Result<T> = std::result::Result<T, PlatformError>;
