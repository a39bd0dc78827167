//! Message channel abstraction.
//!
//! A channel is one participant's framed duplex connection. The desk only
//! talks to participants through this trait; the WebSocket adapter lives in
//! `web::socket` and an in-memory pair lives in `memory`.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::ServerFrame;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Framed duplex connection to one participant.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Stable identity, used to tell channels apart.
    fn id(&self) -> Uuid;

    /// Send one text frame.
    async fn send(&self, text: String) -> Result<(), ChannelError>;

    /// Wait for the next text frame. `None` means the peer is gone.
    ///
    /// Must be cancel-safe: dropping the future loses no frame.
    async fn recv(&self) -> Option<String>;

    /// Close our side. Idempotent.
    async fn close(&self);

    /// Resolves once the channel is unusable, from either side.
    /// Does not consume frames.
    async fn closed(&self);
}

pub type ChannelHandle = Arc<dyn MessageChannel>;

/// Serialize and send a server frame.
pub async fn send_frame(
    channel: &dyn MessageChannel,
    frame: &ServerFrame,
) -> Result<(), ChannelError> {
    let text = serde_json::to_string(frame)?;
    channel.send(text).await
}

/// Send a frame, logging instead of failing.
pub async fn send_best_effort(channel: &dyn MessageChannel, frame: &ServerFrame) {
    if let Err(e) = send_frame(channel, frame).await {
        tracing::debug!("Best-effort send to channel {} failed: {}", channel.id(), e);
    }
}

pub fn same_channel(a: &ChannelHandle, b: &ChannelHandle) -> bool {
    a.id() == b.id()
}
