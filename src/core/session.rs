//! Live pairing of a conversation with its channels and relay tasks.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::conversation::{ConversationId, Role};
use crate::channel::ChannelHandle;

/// The two relay loop handles of an active session.
#[derive(Debug, Default)]
pub struct RelayTasks {
    pub customer: Option<JoinHandle<()>>,
    pub agent: Option<JoinHandle<()>>,
}

impl RelayTasks {
    /// Handles paired with the role whose channel each loop reads.
    pub fn into_handles(self) -> impl Iterator<Item = (Role, JoinHandle<()>)> {
        [(Role::Customer, self.customer), (Role::Agent, self.agent)]
            .into_iter()
            .filter_map(|(role, handle)| handle.map(|h| (role, h)))
    }
}

/// Runtime state for one conversation.
///
/// The customer channel is present for the whole life of the session; the
/// agent channel only once assignment completes.
pub struct Session {
    pub conversation_id: ConversationId,
    pub customer: ChannelHandle,
    pub agent: Option<ChannelHandle>,
    /// Cancels both relay loops.
    pub relay_cancel: CancellationToken,
    pub relay_tasks: RelayTasks,
    /// Fires once teardown has fully completed.
    pub finished: CancellationToken,
}

impl Session {
    pub fn new(conversation_id: &str, customer: ChannelHandle) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            customer,
            agent: None,
            relay_cancel: CancellationToken::new(),
            relay_tasks: RelayTasks::default(),
            finished: CancellationToken::new(),
        }
    }
}
