//! LiveDesk library root.

pub mod channel;
pub mod chat;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod web;

pub use channel::{ChannelHandle, MessageChannel};
pub use chat::{ConnectParams, Desk, DeskOptions, LogSink, TranscriptSink};
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use core::{CloseReason, ClosedConversation, Hub, Role};
pub use error::{Error, Result};
pub use web::run_web_server;
