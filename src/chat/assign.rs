//! Assignment protocol: bind a dequeued conversation to the agent and start
//! relaying.

use std::sync::Arc;

use super::desk::Desk;
use super::relay;
use crate::channel::send_frame;
use crate::core::{Binding, CloseReason, ConversationId, Role};
use crate::protocol::{Partner, ServerFrame};

enum Assignment {
    Started,
    /// Agent vanished; the conversation is back at the head of the queue.
    Requeued,
    /// Conversation withdrawn between dequeue and binding.
    Gone,
    /// An `assigned` notification could not be delivered.
    Failed(CloseReason),
}

impl Desk {
    /// Assign `next` and keep pulling from the queue until a session starts
    /// or nothing is assignable.
    pub(super) async fn dispatch(self: &Arc<Self>, mut next: Option<ConversationId>) {
        while let Some(id) = next.take() {
            match self.assign(&id).await {
                Assignment::Started | Assignment::Requeued => {}
                Assignment::Gone => {
                    tracing::debug!("Conversation {} gone before assignment", id);
                    next = self.hub.try_assign_next().await;
                }
                Assignment::Failed(reason) => {
                    self.teardown(&id, reason, None).await;
                    next = self.hub.try_assign_next().await;
                }
            }
        }
    }

    async fn assign(self: &Arc<Self>, id: &str) -> Assignment {
        let (customer, agent, customer_id, agent_id, relay_cancel) =
            match self.hub.bind_agent(id).await {
                Binding::Bound {
                    customer,
                    agent,
                    customer_id,
                    agent_id,
                    relay_cancel,
                } => (customer, agent, customer_id, agent_id, relay_cancel),
                Binding::Requeued => return Assignment::Requeued,
                Binding::Gone => return Assignment::Gone,
            };

        tracing::info!("Assigned conversation {} to agent {}", id, agent_id);
        self.refresh_positions().await;

        let to_customer = ServerFrame::Assigned {
            conversation_id: id.to_string(),
            partner: Partner {
                role: Role::Agent,
                id: agent_id,
            },
        };
        if let Err(e) = send_frame(&*customer, &to_customer).await {
            tracing::warn!("Could not notify customer of {}: {}", id, e);
            return Assignment::Failed(CloseReason::Unreachable(Role::Customer));
        }

        let to_agent = ServerFrame::Assigned {
            conversation_id: id.to_string(),
            partner: Partner {
                role: Role::Customer,
                id: customer_id,
            },
        };
        if let Err(e) = send_frame(&*agent, &to_agent).await {
            tracing::warn!("Could not notify agent of {}: {}", id, e);
            return Assignment::Failed(CloseReason::Unreachable(Role::Agent));
        }

        let tasks = relay::start(self, id, customer, agent, relay_cancel);
        if let Err(tasks) = self.hub.attach_relay(id, tasks).await {
            // Closed while starting; the loops exit on the cancelled token
            tracing::debug!(
                "Conversation {} closed before relay attached ({} tasks detached)",
                id,
                tasks.into_handles().count()
            );
        }
        Assignment::Started
    }
}
