//! The hub: sole owner of the admission queue, the conversation registry,
//! the session table and the agent slot.
//!
//! Every method takes the one hub lock for a short, I/O-free critical section.
//! Channel sends happen in the callers, after the lock is released.

use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::conversation::{
    CloseReason, ClosedConversation, Conversation, ConversationId, ConversationStatus,
    TranscriptEntry,
};
use super::queue::AdmissionQueue;
use super::session::{RelayTasks, Session};
use crate::channel::{same_channel, ChannelHandle};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HubError {
    #[error("Conversation {0} is already queued")]
    AlreadyQueued(String),

    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("Agent slot already held by {0}")]
    AgentSlotOccupied(String),
}

/// The single agent connection.
struct AgentSlot {
    channel: ChannelHandle,
    id: String,
    /// Conversation this agent has been claimed for, from dequeue until teardown.
    reserved_for: Option<ConversationId>,
}

#[derive(Default)]
struct HubState {
    queue: AdmissionQueue,
    conversations: HashMap<ConversationId, Conversation>,
    sessions: HashMap<ConversationId, Session>,
    agent: Option<AgentSlot>,
    /// Dequeued but not yet bound. A newly attached agent is reserved for it.
    popped: Option<ConversationId>,
}

/// Outcome of binding a dequeued conversation to the agent.
pub enum Binding {
    /// Paired; both channels are ready for `assigned` frames.
    Bound {
        customer: ChannelHandle,
        agent: ChannelHandle,
        customer_id: String,
        agent_id: String,
        relay_cancel: CancellationToken,
    },
    /// The agent went away; the conversation is back at the head of the queue.
    Requeued,
    /// The conversation is no longer waiting.
    Gone,
}

/// Everything teardown needs, taken out of the hub in one step.
pub struct Closing {
    pub record: ClosedConversation,
    pub customer: ChannelHandle,
    pub agent: Option<ChannelHandle>,
    pub relay_cancel: CancellationToken,
    pub relay_tasks: RelayTasks,
    pub finished: CancellationToken,
}

/// Point-in-time view of hub state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Waiting conversation IDs, head first.
    pub waiting: Vec<ConversationId>,
    pub active: Vec<ConversationId>,
    pub agent_id: Option<String>,
    pub agent_busy: bool,
}

pub struct Hub {
    state: Mutex<HubState>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState::default()),
        }
    }

    /// Add a new waiting conversation and its session to the registry.
    pub async fn register(&self, conversation: Conversation, session: Session) {
        let mut state = self.state.lock().await;
        tracing::debug!("Registered conversation {}", conversation.id);
        state.sessions.insert(conversation.id.clone(), session);
        state.conversations.insert(conversation.id.clone(), conversation);
    }

    /// Append a waiting conversation to the admission queue. Returns its 1-based position.
    pub async fn enqueue(&self, id: &str) -> Result<usize, HubError> {
        let mut state = self.state.lock().await;
        match state.conversations.get(id) {
            Some(conv) if conv.is_waiting() => {}
            _ => return Err(HubError::UnknownConversation(id.to_string())),
        }
        let position = state
            .queue
            .push_back(id)
            .ok_or_else(|| HubError::AlreadyQueued(id.to_string()))?;
        tracing::debug!("Enqueued conversation {} at position {}", id, position);
        Ok(position)
    }

    /// Pop the head of the queue if an idle agent is attached.
    ///
    /// This is the only dequeue path. A successful pop reserves the agent for
    /// the returned conversation until it is torn down.
    pub async fn try_assign_next(&self) -> Option<ConversationId> {
        let mut state = self.state.lock().await;
        let HubState {
            queue,
            agent,
            popped,
            ..
        } = &mut *state;
        let slot = agent.as_mut()?;
        if slot.reserved_for.is_some() {
            return None;
        }
        let id = queue.pop_front()?;
        slot.reserved_for = Some(id.clone());
        *popped = Some(id.clone());
        tracing::debug!("Dequeued conversation {} for agent {}", id, slot.id);
        Some(id)
    }

    /// Attach the agent. Fails if another agent holds the slot.
    pub async fn set_agent(&self, channel: ChannelHandle, agent_id: &str) -> Result<(), HubError> {
        let mut state = self.state.lock().await;
        if let Some(slot) = &state.agent {
            return Err(HubError::AgentSlotOccupied(slot.id.clone()));
        }
        let reserved_for = state.popped.clone();
        state.agent = Some(AgentSlot {
            channel,
            id: agent_id.to_string(),
            reserved_for,
        });
        tracing::info!("Agent {} attached", agent_id);
        Ok(())
    }

    /// Detach the agent, but only if `channel` is the one attached.
    pub async fn clear_agent(&self, channel: &ChannelHandle) -> bool {
        let mut state = self.state.lock().await;
        let matches = state
            .agent
            .as_ref()
            .is_some_and(|slot| same_channel(&slot.channel, channel));
        if matches {
            if let Some(slot) = state.agent.take() {
                tracing::info!("Agent {} detached", slot.id);
            }
        }
        matches
    }

    /// Bind a dequeued conversation to the agent and mark it active.
    pub async fn bind_agent(&self, id: &str) -> Binding {
        let mut state = self.state.lock().await;
        let HubState {
            queue,
            conversations,
            sessions,
            agent,
            popped,
        } = &mut *state;

        if popped.as_deref() == Some(id) {
            *popped = None;
        }

        let still_waiting = conversations.get(id).is_some_and(|c| c.is_waiting())
            && sessions.contains_key(id);

        let Some(slot) = agent.as_mut() else {
            if still_waiting {
                queue.push_front(id);
                tracing::info!("No agent for conversation {}, requeued at head", id);
                return Binding::Requeued;
            }
            return Binding::Gone;
        };

        if !still_waiting {
            if slot.reserved_for.as_deref() == Some(id) {
                slot.reserved_for = None;
            }
            return Binding::Gone;
        }

        match slot.reserved_for.as_deref() {
            Some(reserved) if reserved == id => {}
            None => slot.reserved_for = Some(id.to_string()),
            Some(_) => {
                queue.push_front(id);
                tracing::info!("Agent busy for conversation {}, requeued at head", id);
                return Binding::Requeued;
            }
        }

        let (Some(conv), Some(session)) = (conversations.get_mut(id), sessions.get_mut(id)) else {
            return Binding::Gone;
        };
        conv.activate(&slot.id);
        session.agent = Some(slot.channel.clone());

        Binding::Bound {
            customer: session.customer.clone(),
            agent: slot.channel.clone(),
            customer_id: conv.customer_id.clone(),
            agent_id: slot.id.clone(),
            relay_cancel: session.relay_cancel.clone(),
        }
    }

    /// Store the relay task handles of an active session.
    ///
    /// Hands the tasks back if the session is no longer active.
    pub async fn attach_relay(&self, id: &str, tasks: RelayTasks) -> Result<(), RelayTasks> {
        let mut state = self.state.lock().await;
        let active = state
            .conversations
            .get(id)
            .is_some_and(|c| c.status == ConversationStatus::Active);
        match state.sessions.get_mut(id) {
            Some(session) if active => {
                session.relay_tasks = tasks;
                Ok(())
            }
            _ => Err(tasks),
        }
    }

    /// Append a transcript entry. False if the conversation is not active.
    pub async fn record(&self, id: &str, entry: TranscriptEntry) -> bool {
        let mut state = self.state.lock().await;
        state
            .conversations
            .get_mut(id)
            .is_some_and(|conv| conv.record(entry))
    }

    /// Mark a conversation closed and take what teardown needs.
    ///
    /// `None` if the conversation is unknown or already closing, which makes
    /// closure idempotent.
    pub async fn begin_close(&self, id: &str, reason: CloseReason) -> Option<Closing> {
        let mut state = self.state.lock().await;
        let HubState {
            queue,
            conversations,
            sessions,
            ..
        } = &mut *state;

        let conv = conversations.get_mut(id)?;
        if conv.is_closed() {
            return None;
        }
        let session = sessions.get_mut(id)?;

        queue.remove(id);
        let transcript = conv.close();
        let record = ClosedConversation {
            id: conv.id.clone(),
            customer_id: conv.customer_id.clone(),
            agent_id: conv.agent_id.clone(),
            created_at: conv.created_at,
            closed_at: Utc::now(),
            reason,
            transcript,
        };

        Some(Closing {
            record,
            customer: session.customer.clone(),
            agent: session.agent.clone(),
            relay_cancel: session.relay_cancel.clone(),
            relay_tasks: std::mem::take(&mut session.relay_tasks),
            finished: session.finished.clone(),
        })
    }

    /// Drop a closed conversation from the registry and free the agent.
    pub async fn finish_close(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.sessions.remove(id).is_some();
        state.conversations.remove(id);
        if let Some(slot) = state.agent.as_mut() {
            if slot.reserved_for.as_deref() == Some(id) {
                slot.reserved_for = None;
            }
        }
        removed
    }

    /// Remove a conversation that is still waiting. `None` once it has been bound.
    pub async fn withdraw(&self, id: &str) -> Option<Conversation> {
        let mut state = self.state.lock().await;
        if !state.conversations.get(id).is_some_and(|c| c.is_waiting()) {
            return None;
        }
        state.queue.remove(id);
        state.sessions.remove(id);
        if let Some(slot) = state.agent.as_mut() {
            if slot.reserved_for.as_deref() == Some(id) {
                slot.reserved_for = None;
            }
        }
        let mut conv = state.conversations.remove(id)?;
        conv.close();
        tracing::info!("Conversation {} withdrawn from queue", id);
        Some(conv)
    }

    /// Open conversations whose session is bound to the given agent channel.
    pub async fn sessions_for_agent(&self, channel_id: Uuid) -> Vec<ConversationId> {
        let state = self.state.lock().await;
        state
            .sessions
            .values()
            .filter(|s| s.agent.as_ref().is_some_and(|a| a.id() == channel_id))
            .filter(|s| {
                state
                    .conversations
                    .get(&s.conversation_id)
                    .is_some_and(|c| !c.is_closed())
            })
            .map(|s| s.conversation_id.clone())
            .collect()
    }

    /// Customer channels of every queued conversation with their current position.
    pub async fn waiting_channels(&self) -> Vec<(ChannelHandle, usize)> {
        let state = self.state.lock().await;
        state
            .queue
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| {
                state
                    .sessions
                    .get(id)
                    .map(|s| (s.customer.clone(), idx + 1))
            })
            .collect()
    }

    pub async fn queue_position(&self, id: &str) -> Option<usize> {
        self.state.lock().await.queue.position(id)
    }

    pub async fn conversation(&self, id: &str) -> Option<Conversation> {
        self.state.lock().await.conversations.get(id).cloned()
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        let state = self.state.lock().await;
        let mut active: Vec<ConversationId> = state
            .conversations
            .values()
            .filter(|c| c.status == ConversationStatus::Active)
            .map(|c| c.id.clone())
            .collect();
        active.sort();

        HubSnapshot {
            waiting: state.queue.iter().cloned().collect(),
            active,
            agent_id: state.agent.as_ref().map(|slot| slot.id.clone()),
            agent_busy: state
                .agent
                .as_ref()
                .is_some_and(|slot| slot.reserved_for.is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory;
    use crate::core::Role;

    async fn waiting(hub: &Hub) -> (ConversationId, memory::MemoryPeer) {
        let (channel, peer) = memory::pair();
        let conv = Conversation::new("cust");
        let id = conv.id.clone();
        hub.register(conv, Session::new(&id, channel)).await;
        hub.enqueue(&id).await.unwrap();
        (id, peer)
    }

    #[tokio::test]
    async fn test_enqueue_positions() {
        let hub = Hub::new();
        let (a, _pa) = waiting(&hub).await;
        let (b, _pb) = waiting(&hub).await;

        assert_eq!(hub.queue_position(&a).await, Some(1));
        assert_eq!(hub.queue_position(&b).await, Some(2));
        assert_eq!(hub.enqueue(&a).await, Err(HubError::AlreadyQueued(a.clone())));
        assert_eq!(
            hub.enqueue("missing").await,
            Err(HubError::UnknownConversation("missing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_try_assign_requires_idle_agent() {
        let hub = Hub::new();
        let (a, _pa) = waiting(&hub).await;
        let (b, _pb) = waiting(&hub).await;

        // No agent: nothing moves
        assert_eq!(hub.try_assign_next().await, None);
        assert_eq!(hub.snapshot().await.waiting, vec![a.clone(), b.clone()]);

        let (agent, _agent_peer) = memory::pair();
        hub.set_agent(agent, "agent-1").await.unwrap();

        assert_eq!(hub.try_assign_next().await, Some(a.clone()));
        // Agent is reserved for `a`
        assert_eq!(hub.try_assign_next().await, None);
        assert!(hub.snapshot().await.agent_busy);

        assert!(matches!(hub.bind_agent(&a).await, Binding::Bound { .. }));
        assert_eq!(hub.snapshot().await.active, vec![a.clone()]);

        hub.begin_close(&a, CloseReason::Closed).await.unwrap();
        hub.finish_close(&a).await;
        assert_eq!(hub.try_assign_next().await, Some(b));
    }

    #[tokio::test]
    async fn test_agent_slot_guards() {
        let hub = Hub::new();
        let (first, _p1) = memory::pair();
        let (second, _p2) = memory::pair();
        let first: ChannelHandle = first;
        let second: ChannelHandle = second;

        hub.set_agent(first.clone(), "agent-1").await.unwrap();
        assert_eq!(
            hub.set_agent(second.clone(), "agent-2").await,
            Err(HubError::AgentSlotOccupied("agent-1".to_string()))
        );

        // Stale detach is a no-op
        assert!(!hub.clear_agent(&second).await);
        assert_eq!(hub.snapshot().await.agent_id.as_deref(), Some("agent-1"));

        assert!(hub.clear_agent(&first).await);
        assert!(!hub.clear_agent(&first).await);
        hub.set_agent(second, "agent-2").await.unwrap();
    }

    #[tokio::test]
    async fn test_requeue_on_race() {
        let hub = Hub::new();
        let (a, _pa) = waiting(&hub).await;
        let (b, _pb) = waiting(&hub).await;

        let (agent, _agent_peer) = memory::pair();
        let agent: ChannelHandle = agent;
        hub.set_agent(agent.clone(), "agent-1").await.unwrap();
        assert_eq!(hub.try_assign_next().await, Some(a.clone()));

        // Agent leaves between pop and bind
        hub.clear_agent(&agent).await;
        assert!(matches!(hub.bind_agent(&a).await, Binding::Requeued));
        assert_eq!(hub.snapshot().await.waiting, vec![a.clone(), b]);

        let (fresh, _fresh_peer) = memory::pair();
        hub.set_agent(fresh, "agent-2").await.unwrap();
        assert_eq!(hub.try_assign_next().await, Some(a));
    }

    #[tokio::test]
    async fn test_agent_swap_between_pop_and_bind() {
        let hub = Hub::new();
        let (a, _pa) = waiting(&hub).await;
        let (b, _pb) = waiting(&hub).await;

        let (first, _first_peer) = memory::pair();
        let first: ChannelHandle = first;
        hub.set_agent(first.clone(), "agent-1").await.unwrap();
        assert_eq!(hub.try_assign_next().await, Some(a.clone()));

        // The replacement arrives before `a` is bound and must not skip ahead to `b`
        hub.clear_agent(&first).await;
        let (second, _second_peer) = memory::pair();
        hub.set_agent(second, "agent-2").await.unwrap();
        assert!(hub.snapshot().await.agent_busy);
        assert_eq!(hub.try_assign_next().await, None);

        match hub.bind_agent(&a).await {
            Binding::Bound { agent_id, .. } => assert_eq!(agent_id, "agent-2"),
            _ => panic!("expected `a` to bind to the new agent"),
        }
        assert_eq!(hub.snapshot().await.waiting, vec![b]);
    }

    #[tokio::test]
    async fn test_withdraw_releases_reservation() {
        let hub = Hub::new();
        let (a, _pa) = waiting(&hub).await;
        let (b, _pb) = waiting(&hub).await;

        let (agent, _agent_peer) = memory::pair();
        hub.set_agent(agent, "agent-1").await.unwrap();
        assert_eq!(hub.try_assign_next().await, Some(a.clone()));

        let withdrawn = hub.withdraw(&a).await.unwrap();
        assert!(withdrawn.is_closed());
        assert!(matches!(hub.bind_agent(&a).await, Binding::Gone));
        assert!(hub.conversation(&a).await.is_none());

        assert_eq!(hub.try_assign_next().await, Some(b));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_freezes_transcript() {
        let hub = Hub::new();
        let (a, _pa) = waiting(&hub).await;
        let (agent, _agent_peer) = memory::pair();
        hub.set_agent(agent, "agent-1").await.unwrap();
        hub.try_assign_next().await;
        assert!(matches!(hub.bind_agent(&a).await, Binding::Bound { .. }));

        let entry = TranscriptEntry {
            sender_role: Role::Customer,
            content: "hi".to_string(),
            ts: crate::core::now_iso(),
        };
        assert!(hub.record(&a, entry.clone()).await);

        let closing = hub.begin_close(&a, CloseReason::Closed).await.unwrap();
        assert_eq!(closing.record.transcript, vec![entry.clone()]);
        assert_eq!(closing.record.agent_id.as_deref(), Some("agent-1"));

        assert!(hub.begin_close(&a, CloseReason::Closed).await.is_none());
        assert!(!hub.record(&a, entry).await);

        assert!(hub.finish_close(&a).await);
        assert!(!hub.finish_close(&a).await);
        assert!(hub.begin_close(&a, CloseReason::Closed).await.is_none());
    }
}
