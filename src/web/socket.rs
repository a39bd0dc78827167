//! WebSocket adapter for [`MessageChannel`].

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{ChannelError, MessageChannel};

/// One upgraded WebSocket.
///
/// A reader task drains the socket into a bounded buffer so `recv` stays
/// cancel-safe; writes go straight to the split sink.
pub struct WsChannel {
    id: Uuid,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    inbound: Mutex<mpsc::Receiver<String>>,
    closed: CancellationToken,
    reader: JoinHandle<()>,
}

impl WsChannel {
    pub fn new(socket: WebSocket, inbound_buffer: usize) -> Self {
        let id = Uuid::new_v4();
        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::channel(inbound_buffer.max(1));
        let closed = CancellationToken::new();

        let reader_closed = closed.clone();
        let reader = tokio::spawn(async move {
            pump_inbound(id, stream, tx).await;
            reader_closed.cancel();
        });

        Self {
            id,
            sink: Mutex::new(sink),
            inbound: Mutex::new(rx),
            closed,
            reader,
        }
    }
}

/// Move text frames from the socket into `tx` until the peer goes away.
///
/// Never waits for buffer space: nobody reads an idle agent or a waiting
/// customer, and the close frame behind a full buffer must still be seen.
/// Frames that do not fit are dropped.
async fn pump_inbound<S, E>(id: Uuid, mut stream: S, tx: mpsc::Sender<String>)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut dropped = 0usize;
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("WebSocket {} read error: {}", id, e);
                break;
            }
        };
        match tx.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                if dropped == 1 {
                    tracing::warn!("WebSocket {} inbound buffer full, dropping frames", id);
                }
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    tracing::debug!("WebSocket {} reader finished ({} frames dropped)", id, dropped);
}

#[async_trait]
impl MessageChannel for WsChannel {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, text: String) -> Result<(), ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Option<String> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        if self.closed.is_cancelled() && self.reader.is_finished() {
            return;
        }
        self.closed.cancel();
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(None)).await {
            tracing::debug!("WebSocket {} close frame not sent: {}", self.id, e);
        }
        if let Err(e) = sink.close().await {
            tracing::debug!("WebSocket {} sink not closed cleanly: {}", self.id, e);
        }
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
