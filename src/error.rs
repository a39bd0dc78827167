//! Error types for LiveDesk.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::core::HubError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Web error: {0}")]
    Web(String),

    #[error("{0}")]
    Other(String),
}
