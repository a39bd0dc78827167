//! Conversation tracking for LiveDesk.
//!
//! A conversation moves through `waiting -> active -> closed` and carries an
//! append-only transcript while it is active.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversation identifier (opaque UUID string).
pub type ConversationId = String;

/// Which side of a pairing a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Agent => "agent",
        }
    }

    /// The other side of the pairing.
    pub fn partner(&self) -> Role {
        match self {
            Role::Customer => Role::Agent,
            Role::Agent => Role::Customer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "agent" => Ok(Role::Agent),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Conversation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Waiting,
    Active,
    Closed,
}

/// Why a conversation ended, as reported in `ended` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CloseReason {
    /// Either side sent `end`.
    Closed,
    /// The given side disconnected.
    Left(Role),
    /// Delivery to the given side failed.
    Unreachable(Role),
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Closed => "closed",
            CloseReason::Left(Role::Customer) => "customer_left",
            CloseReason::Left(Role::Agent) => "agent_left",
            CloseReason::Unreachable(Role::Customer) => "customer_unreachable",
            CloseReason::Unreachable(Role::Agent) => "agent_unreachable",
        }
    }

    /// Only agent-side failures take the agent channel down with the conversation.
    pub fn closes_agent(&self) -> bool {
        matches!(
            self,
            CloseReason::Left(Role::Agent) | CloseReason::Unreachable(Role::Agent)
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CloseReason> for String {
    fn from(reason: CloseReason) -> Self {
        reason.as_str().to_string()
    }
}

impl TryFrom<String> for CloseReason {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "closed" => Ok(CloseReason::Closed),
            "customer_left" => Ok(CloseReason::Left(Role::Customer)),
            "agent_left" => Ok(CloseReason::Left(Role::Agent)),
            "customer_unreachable" => Ok(CloseReason::Unreachable(Role::Customer)),
            "agent_unreachable" => Ok(CloseReason::Unreachable(Role::Agent)),
            other => Err(format!("unknown close reason: {}", other)),
        }
    }
}

/// One recorded chat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sender_role: Role,
    pub content: String,
    pub ts: String,
}

/// A conversation as handed off at closure.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedConversation {
    pub id: ConversationId,
    pub customer_id: String,
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub reason: CloseReason,
    pub transcript: Vec<TranscriptEntry>,
}

/// A customer conversation.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// When the customer said hello
    pub created_at: DateTime<Utc>,

    pub status: ConversationStatus,

    /// Opaque customer identity
    pub customer_id: String,

    /// Set once an agent is assigned
    pub agent_id: Option<String>,

    transcript: Vec<TranscriptEntry>,
}

impl Conversation {
    /// Create a new waiting conversation with a fresh ID.
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            status: ConversationStatus::Waiting,
            customer_id: customer_id.into(),
            agent_id: None,
            transcript: Vec::new(),
        }
    }

    /// Mark the conversation active and record its agent.
    pub fn activate(&mut self, agent_id: &str) {
        self.status = ConversationStatus::Active;
        self.agent_id = Some(agent_id.to_string());
    }

    /// Append to the transcript. Only active conversations accept entries.
    pub fn record(&mut self, entry: TranscriptEntry) -> bool {
        if self.status != ConversationStatus::Active {
            return false;
        }
        self.transcript.push(entry);
        true
    }

    /// Mark closed and hand the transcript over.
    pub fn close(&mut self) -> Vec<TranscriptEntry> {
        self.status = ConversationStatus::Closed;
        std::mem::take(&mut self.transcript)
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn is_waiting(&self) -> bool {
        self.status == ConversationStatus::Waiting
    }

    pub fn is_closed(&self) -> bool {
        self.status == ConversationStatus::Closed
    }
}

/// Current timestamp in RFC 3339, as used on the wire.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(role: Role, content: &str) -> TranscriptEntry {
        TranscriptEntry {
            sender_role: role,
            content: content.to_string(),
            ts: now_iso(),
        }
    }

    #[test]
    fn test_conversation_lifecycle() {
        let mut conv = Conversation::new("cust-1");
        assert!(conv.is_waiting());
        assert!(conv.agent_id.is_none());

        // Waiting conversations do not record
        assert!(!conv.record(entry(Role::Customer, "too early")));

        conv.activate("agent-1");
        assert_eq!(conv.status, ConversationStatus::Active);
        assert_eq!(conv.agent_id.as_deref(), Some("agent-1"));

        assert!(conv.record(entry(Role::Customer, "hi")));
        assert!(conv.record(entry(Role::Agent, "hello")));
        assert_eq!(conv.transcript().len(), 2);

        let transcript = conv.close();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "hi");
        assert!(conv.is_closed());

        // Closed conversations do not record
        assert!(!conv.record(entry(Role::Agent, "late")));
        assert!(conv.transcript().is_empty());
    }

    #[test]
    fn test_unique_ids() {
        let a = Conversation::new("c");
        let b = Conversation::new("c");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_close_reason_strings() {
        let reasons = [
            (CloseReason::Closed, "closed", false),
            (CloseReason::Left(Role::Customer), "customer_left", false),
            (CloseReason::Left(Role::Agent), "agent_left", true),
            (CloseReason::Unreachable(Role::Customer), "customer_unreachable", false),
            (CloseReason::Unreachable(Role::Agent), "agent_unreachable", true),
        ];

        for (reason, text, closes_agent) in reasons {
            assert_eq!(reason.as_str(), text);
            assert_eq!(reason.closes_agent(), closes_agent);
            assert_eq!(CloseReason::try_from(text.to_string()), Ok(reason));
            assert_eq!(serde_json::to_value(reason).unwrap(), text);
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("customer".parse::<Role>(), Ok(Role::Customer));
        assert_eq!("agent".parse::<Role>(), Ok(Role::Agent));
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(Role::Customer.partner(), Role::Agent);
    }
}
