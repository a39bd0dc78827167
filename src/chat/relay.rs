//! Relay engine: one loop per direction of an active session.
//!
//! Each loop reads frames from its source channel, records chat messages in
//! the transcript and mirrors them to the destination. Malformed input is
//! answered with an `error` frame and the loop carries on; disconnects,
//! delivery failures and `end` frames go through the lifecycle controller.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::desk::Desk;
use crate::channel::{send_best_effort, send_frame, ChannelHandle};
use crate::core::{now_iso, CloseReason, ConversationId, RelayTasks, Role, TranscriptEntry};
use crate::protocol::{ChatMessage, ClientFrame, ServerFrame};

/// Spawn both relay loops for a freshly assigned conversation.
pub(super) fn start(
    desk: &Arc<Desk>,
    conversation_id: &str,
    customer: ChannelHandle,
    agent: ChannelHandle,
    cancel: CancellationToken,
) -> RelayTasks {
    let from_customer = RelayLoop {
        desk: Arc::clone(desk),
        conversation_id: conversation_id.to_string(),
        role: Role::Customer,
        source: customer.clone(),
        destination: agent.clone(),
        cancel: cancel.clone(),
    };
    let from_agent = RelayLoop {
        desk: Arc::clone(desk),
        conversation_id: conversation_id.to_string(),
        role: Role::Agent,
        source: agent,
        destination: customer,
        cancel,
    };

    RelayTasks {
        customer: Some(tokio::spawn(from_customer.run())),
        agent: Some(tokio::spawn(from_agent.run())),
    }
}

enum Step {
    Continue,
    Close(CloseReason),
    /// The conversation closed underneath us.
    Stop,
}

struct RelayLoop {
    desk: Arc<Desk>,
    conversation_id: ConversationId,
    /// Role of the participant behind `source`.
    role: Role,
    source: ChannelHandle,
    destination: ChannelHandle,
    cancel: CancellationToken,
}

impl RelayLoop {
    // Boxed so the loop's future type does not nest inside the lifecycle
    // futures that spawn it.
    fn run(self) -> BoxFuture<'static, ()> {
        Box::pin(self.pump())
    }

    async fn pump(self) {
        tracing::debug!("Relay from {} started for {}", self.role, self.conversation_id);

        loop {
            let raw = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Relay from {} cancelled for {}", self.role, self.conversation_id);
                    return;
                }
                raw = self.source.recv() => raw,
            };

            let step = match raw {
                Some(raw) => self.handle(&raw).await,
                None => Step::Close(CloseReason::Left(self.role)),
            };

            match step {
                Step::Continue => {}
                Step::Close(reason) => {
                    self.desk
                        .close(&self.conversation_id, reason, Some(self.role))
                        .await;
                    return;
                }
                Step::Stop => return,
            }
        }
    }

    async fn handle(&self, raw: &str) -> Step {
        let frame = match ClientFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Bad frame from {} in {}: {}", self.role, self.conversation_id, e);
                send_best_effort(&*self.source, &e.to_frame()).await;
                return Step::Continue;
            }
        };

        if let Some(other) = frame.conversation_id() {
            if other != self.conversation_id {
                // Left over from an earlier conversation on this channel
                tracing::debug!(
                    "Ignoring frame from {} for {} in {}",
                    self.role,
                    other,
                    self.conversation_id
                );
                return Step::Continue;
            }
        }

        match frame {
            ClientFrame::MessageSend { content, .. } => {
                self.relay_message(content.as_deref().unwrap_or_default()).await
            }
            ClientFrame::End { .. } => Step::Close(CloseReason::Closed),
            ClientFrame::Hello => {
                send_best_effort(&*self.source, &ServerFrame::bad_request("unexpected hello"))
                    .await;
                Step::Continue
            }
        }
    }

    async fn relay_message(&self, content: &str) -> Step {
        let content = content.trim();
        if content.is_empty() {
            send_best_effort(&*self.source, &ServerFrame::bad_request("empty content")).await;
            return Step::Continue;
        }

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: self.conversation_id.clone(),
            sender_role: self.role,
            content: content.to_string(),
            ts: now_iso(),
        };
        let entry = TranscriptEntry {
            sender_role: self.role,
            content: message.content.clone(),
            ts: message.ts.clone(),
        };
        if !self.desk.hub.record(&self.conversation_id, entry).await {
            tracing::debug!("Dropping message for closed conversation {}", self.conversation_id);
            return Step::Stop;
        }

        let frame = ServerFrame::MessageNew { message };
        if let Err(e) = send_frame(&*self.destination, &frame).await {
            let destination = self.role.partner();
            tracing::warn!(
                "Delivery to {} failed in {}: {}",
                destination,
                self.conversation_id,
                e
            );
            return Step::Close(CloseReason::Unreachable(destination));
        }

        // Echo failures are left to the sender's own receive path
        send_best_effort(&*self.source, &frame).await;
        Step::Continue
    }
}
