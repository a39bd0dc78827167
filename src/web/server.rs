//! Web server using Axum.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use super::router::{create_app_router, AppState};
use crate::chat::{Desk, DeskOptions, LogSink};
use crate::config::Settings;
use crate::error::{Error, Result};

/// Web server configuration.
pub struct WebServerConfig {
    pub port: u16,
    pub host: String,
    /// Frames buffered per socket before the reader applies backpressure.
    pub inbound_buffer: usize,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for WebServerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            port: settings.server.port,
            host: settings.server.host.clone(),
            inbound_buffer: settings.relay.inbound_buffer,
        }
    }
}

/// Run the web server until `shutdown` fires.
pub async fn run_server(
    config: WebServerConfig,
    desk: Arc<Desk>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = create_app_router(AppState {
        desk,
        inbound_buffer: config.inbound_buffer,
    })
    .layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Web(format!("Invalid address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("LiveDesk listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Web server stopped");
    Ok(())
}

/// Build a desk from settings and serve it.
pub async fn run_web_server(settings: &Settings, shutdown: CancellationToken) -> Result<()> {
    let desk = Desk::new(DeskOptions::from(settings), Arc::new(LogSink));
    run_server(WebServerConfig::from(settings), desk, shutdown).await
}
