//! The desk: entry point for every participant connection.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::transcript::TranscriptSink;
use crate::channel::{send_best_effort, ChannelHandle};
use crate::config::Settings;
use crate::core::{CloseReason, Conversation, Hub, Role, Session};
use crate::protocol::{ClientFrame, ErrorCode, ServerFrame};

/// Runtime knobs for the desk.
#[derive(Debug, Clone)]
pub struct DeskOptions {
    /// Agent ID used when an agent connects without one.
    pub default_agent_id: String,
    /// How long teardown waits for each cancelled relay task.
    pub relay_shutdown_timeout: Duration,
}

impl Default for DeskOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for DeskOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            default_agent_id: settings.agent.default_id.clone(),
            relay_shutdown_timeout: settings.relay.shutdown_timeout(),
        }
    }
}

/// Connection parameters chosen by the client at connect time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectParams {
    /// `customer` (default) or `agent`.
    pub role: Option<String>,
    /// Opaque participant identity.
    pub id: Option<String>,
}

/// Pairs customers with the agent and relays their chat.
pub struct Desk {
    pub(super) hub: Hub,
    pub(super) sink: Arc<dyn TranscriptSink>,
    pub(super) options: DeskOptions,
}

impl Desk {
    pub fn new(options: DeskOptions, sink: Arc<dyn TranscriptSink>) -> Arc<Self> {
        Arc::new(Self {
            hub: Hub::new(),
            sink,
            options,
        })
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Serve one connection for as long as it takes part in the desk.
    ///
    /// For a customer this returns once its conversation is gone; for the
    /// agent, once its channel closes.
    pub async fn accept(self: Arc<Self>, channel: ChannelHandle, params: ConnectParams) {
        let role = match params.role.as_deref().unwrap_or("customer").parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!("Rejecting connection {}: {}", channel.id(), e);
                send_best_effort(&*channel, &ServerFrame::bad_request(e)).await;
                channel.close().await;
                return;
            }
        };

        tracing::debug!("Accepted {} connection {}", role, channel.id());
        send_best_effort(
            &*channel,
            &ServerFrame::Ready {
                role,
                conversation_id: None,
            },
        )
        .await;

        match role {
            Role::Customer => self.serve_customer(channel, params.id).await,
            Role::Agent => self.serve_agent(channel, params.id).await,
        }
    }

    async fn serve_customer(self: &Arc<Self>, channel: ChannelHandle, customer_id: Option<String>) {
        let Some(raw) = channel.recv().await else {
            tracing::debug!("Customer {} left before hello", channel.id());
            return;
        };

        let rejection = match ClientFrame::parse(&raw) {
            Ok(ClientFrame::Hello) => None,
            Ok(_) => Some(ServerFrame::bad_request("first message must be 'hello'")),
            Err(e) => Some(e.to_frame()),
        };
        if let Some(frame) = rejection {
            tracing::debug!("Rejecting customer {}: bad first frame", channel.id());
            send_best_effort(&*channel, &frame).await;
            channel.close().await;
            return;
        }

        let conversation =
            Conversation::new(customer_id.unwrap_or_else(|| Uuid::new_v4().to_string()));
        let id = conversation.id.clone();
        let session = Session::new(&id, channel.clone());
        let finished = session.finished.clone();
        self.hub.register(conversation, session).await;
        tracing::info!("Customer joined with conversation {}", id);

        send_best_effort(
            &*channel,
            &ServerFrame::Ready {
                role: Role::Customer,
                conversation_id: Some(id.clone()),
            },
        )
        .await;

        match self.hub.enqueue(&id).await {
            Ok(position) => {
                send_best_effort(&*channel, &ServerFrame::QueueUpdate { position }).await;
            }
            Err(e) => tracing::error!("Could not queue conversation {}: {}", id, e),
        }

        let next = self.hub.try_assign_next().await;
        self.dispatch(next).await;

        tokio::select! {
            _ = finished.cancelled() => {}
            _ = channel.closed() => {
                if self.hub.withdraw(&id).await.is_some() {
                    tracing::info!("Customer of conversation {} left while waiting", id);
                    channel.close().await;
                    self.refresh_positions().await;
                } else {
                    // Bound already; the relay or lifecycle owns the rest
                    finished.cancelled().await;
                }
            }
        }
    }

    async fn serve_agent(self: &Arc<Self>, channel: ChannelHandle, agent_id: Option<String>) {
        let agent_id = agent_id.unwrap_or_else(|| self.options.default_agent_id.clone());

        if let Err(e) = self.hub.set_agent(channel.clone(), &agent_id).await {
            tracing::warn!("Rejecting agent {}: {}", agent_id, e);
            send_best_effort(
                &*channel,
                &ServerFrame::error(ErrorCode::AgentPresent, e.to_string()),
            )
            .await;
            channel.close().await;
            return;
        }

        // A backlog may have built up while no agent was attached
        let next = self.hub.try_assign_next().await;
        self.dispatch(next).await;

        channel.closed().await;
        tracing::info!("Agent {} disconnected", agent_id);

        self.hub.clear_agent(&channel).await;
        for id in self.hub.sessions_for_agent(channel.id()).await {
            self.end_conversation(&id, CloseReason::Left(Role::Agent)).await;
        }
        channel.close().await;
    }

    /// Tell every waiting customer where it now stands.
    pub(super) async fn refresh_positions(&self) {
        for (channel, position) in self.hub.waiting_channels().await {
            send_best_effort(&*channel, &ServerFrame::QueueUpdate { position }).await;
        }
    }
}
