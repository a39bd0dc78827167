//! Core module - conversations, admission queue, sessions and the hub.
//!
//! This module holds all shared pairing state:
//! - Conversation model and transcript
//! - FIFO admission queue
//! - Session table entries
//! - The hub that serializes every state transition

pub mod conversation;
pub mod hub;
pub mod queue;
pub mod session;

pub use conversation::{
    now_iso, CloseReason, ClosedConversation, Conversation, ConversationId, ConversationStatus,
    Role, TranscriptEntry,
};
pub use hub::{Binding, Closing, Hub, HubError, HubSnapshot};
pub use queue::AdmissionQueue;
pub use session::{RelayTasks, Session};
