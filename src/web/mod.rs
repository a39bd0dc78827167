//! Web server module (Axum + WebSocket transport).

pub mod router;
pub mod server;
pub mod socket;

pub use server::{run_server, run_web_server, WebServerConfig};
pub use socket::WsChannel;
