//! Error types for the data-plane admin client.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection to data plane failed: {0}")]
    Connection(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("data plane returned invalid JSON: {0}")]
    InvalidResponse(String),

    #[error("data plane rejected config ({status}): {message}")]
    ConfigRejected { status: u16, message: String },

    #[error("gave up after {0} attempts")]
    RetriesExhausted(u32),
}
