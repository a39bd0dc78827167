//! In-process channel pair.
//!
//! The server half implements [`MessageChannel`]; the [`MemoryPeer`] half
//! plays the remote participant. Useful for embedding the desk behind a
//! custom transport and for driving it in tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ChannelError, MessageChannel};

/// Server half of an in-memory pair.
pub struct MemoryChannel {
    id: Uuid,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    closed: CancellationToken,
    fail_sends: Arc<AtomicBool>,
}

/// Remote half of an in-memory pair.
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
    closed: CancellationToken,
    fail_sends: Arc<AtomicBool>,
}

/// Create a connected pair.
pub fn pair() -> (Arc<MemoryChannel>, MemoryPeer) {
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let (to_peer, from_server) = mpsc::unbounded_channel();
    let closed = CancellationToken::new();
    let fail_sends = Arc::new(AtomicBool::new(false));

    let channel = MemoryChannel {
        id: Uuid::new_v4(),
        inbound: AsyncMutex::new(from_peer),
        outbound: Mutex::new(Some(to_peer)),
        closed: closed.clone(),
        fail_sends: fail_sends.clone(),
    };
    let peer = MemoryPeer {
        tx: Some(to_server),
        rx: from_server,
        closed,
        fail_sends,
    };

    (Arc::new(channel), peer)
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, text: String) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed("peer unreachable".to_string()));
        }
        let guard = self
            .outbound
            .lock()
            .map_err(|_| ChannelError::SendFailed("outbound lock poisoned".to_string()))?;
        match guard.as_ref() {
            Some(tx) => tx.send(text).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    async fn recv(&self) -> Option<String> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        if let Ok(mut guard) = self.outbound.lock() {
            guard.take();
        }
        self.closed.cancel();
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl MemoryPeer {
    /// Send a raw text frame to the server.
    pub fn send_raw(&self, text: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(text.into());
        }
    }

    /// Send a JSON frame to the server.
    pub fn send_json(&self, value: serde_json::Value) {
        self.send_raw(value.to_string());
    }

    /// Next frame from the server, or `None` if none arrives within `wait`
    /// or the server closed the channel.
    pub async fn next_frame_within(&mut self, wait: Duration) -> Option<serde_json::Value> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(text)) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    /// Next frame from the server, waiting up to one second.
    pub async fn next_frame(&mut self) -> Option<serde_json::Value> {
        self.next_frame_within(Duration::from_secs(1)).await
    }

    /// Whether the server has closed its side, once any pending frames are drained.
    pub async fn is_closed_by_server(&mut self) -> bool {
        loop {
            match tokio::time::timeout(Duration::from_secs(1), self.rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    /// Make every server send to this peer fail from now on.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Drop the connection from the peer side.
    pub fn disconnect(&mut self) {
        self.tx.take();
        self.closed.cancel();
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let (channel, mut peer) = pair();

        peer.send_raw(r#"{"type":"hello"}"#);
        assert_eq!(channel.recv().await.as_deref(), Some(r#"{"type":"hello"}"#));

        channel.send(r#"{"type":"queue.update","position":1}"#.to_string()).await.unwrap();
        let frame = peer.next_frame().await.unwrap();
        assert_eq!(frame["position"], 1);
    }

    #[tokio::test]
    async fn test_peer_disconnect() {
        let (channel, mut peer) = pair();
        peer.send_raw("last words");
        peer.disconnect();

        // Buffered frames drain before the disconnect is observed
        assert_eq!(channel.recv().await.as_deref(), Some("last words"));
        assert_eq!(channel.recv().await, None);
        channel.closed().await;
    }

    #[tokio::test]
    async fn test_server_close() {
        let (channel, mut peer) = pair();
        channel.close().await;
        channel.close().await;

        assert!(matches!(
            channel.send("x".to_string()).await,
            Err(ChannelError::Closed)
        ));
        assert!(peer.is_closed_by_server().await);
    }

    #[tokio::test]
    async fn test_fail_sends() {
        let (channel, peer) = pair();
        peer.fail_sends();
        assert!(matches!(
            channel.send("x".to_string()).await,
            Err(ChannelError::SendFailed(_))
        ));
    }
}
