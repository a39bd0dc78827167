//! Conversation lifecycle controller.
//!
//! All closure paths (disconnect, delivery failure, `end`, agent departure)
//! funnel through [`Desk::end_conversation`] or its relay-side twin, so
//! teardown and re-dispatch live in one place.

use std::sync::Arc;

use super::desk::Desk;
use crate::channel::send_best_effort;
use crate::core::{CloseReason, Closing, Role};
use crate::protocol::ServerFrame;

impl Desk {
    /// Close a conversation and hand the agent the next waiting customer.
    ///
    /// No-op for unknown or already closed conversations.
    pub async fn end_conversation(self: &Arc<Self>, id: &str, reason: CloseReason) {
        self.close(id, reason, None).await
    }

    /// `caller` is the role whose relay loop is closing; that loop is not
    /// awaited during teardown because it is the one running it.
    pub(super) async fn close(self: &Arc<Self>, id: &str, reason: CloseReason, caller: Option<Role>) {
        if self.teardown(id, reason, caller).await {
            let next = self.hub.try_assign_next().await;
            self.dispatch(next).await;
        }
    }

    /// Tear down one session. Returns false if someone else already did.
    pub(super) async fn teardown(&self, id: &str, reason: CloseReason, caller: Option<Role>) -> bool {
        let Some(closing) = self.hub.begin_close(id, reason).await else {
            tracing::debug!("Conversation {} already closed", id);
            return false;
        };
        let Closing {
            record,
            customer,
            agent,
            relay_cancel,
            relay_tasks,
            finished,
        } = closing;

        tracing::info!(
            "Closing conversation {} ({}), {} messages",
            id,
            reason,
            record.transcript.len()
        );
        self.sink.conversation_closed(record).await;

        let ended = ServerFrame::Ended {
            conversation_id: id.to_string(),
            reason,
        };
        send_best_effort(&*customer, &ended).await;
        if let Some(agent) = &agent {
            send_best_effort(&**agent, &ended).await;
        }

        relay_cancel.cancel();
        for (role, handle) in relay_tasks.into_handles() {
            if caller == Some(role) {
                continue;
            }
            match tokio::time::timeout(self.options.relay_shutdown_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Relay from {} in {} failed: {}", role, id, e),
                Err(_) => tracing::warn!(
                    "Relay from {} in {} did not stop within {:?}, detaching",
                    role,
                    id,
                    self.options.relay_shutdown_timeout
                ),
            }
        }

        customer.close().await;
        if reason.closes_agent() {
            if let Some(agent) = &agent {
                agent.close().await;
                self.hub.clear_agent(agent).await;
            }
        }

        self.hub.finish_close(id).await;
        finished.cancel();
        true
    }
}
