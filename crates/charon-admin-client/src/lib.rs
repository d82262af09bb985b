//! HTTP client for the data-plane's JSON admin API.

mod client;
mod error;

pub use client::{ClientConfig, DataPlaneClient};
pub use error::ClientError;
