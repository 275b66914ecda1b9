use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtherscanError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
