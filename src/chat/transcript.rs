//! Hand-off point for closed conversations.

use async_trait::async_trait;

use crate::core::ClosedConversation;

/// Receives every conversation once it closes, transcript included.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn conversation_closed(&self, record: ClosedConversation);
}

/// Writes closed transcripts to the log.
pub struct LogSink;

#[async_trait]
impl TranscriptSink for LogSink {
    async fn conversation_closed(&self, record: ClosedConversation) {
        let transcript = serde_json::to_string_pretty(&record.transcript)
            .unwrap_or_else(|e| format!("<unserializable transcript: {}>", e));

        tracing::info!(
            conversation_id = %record.id,
            reason = %record.reason,
            customer_id = %record.customer_id,
            agent_id = record.agent_id.as_deref().unwrap_or("-"),
            messages = record.transcript.len(),
            "Conversation closed at {}\n{}",
            record.closed_at.to_rfc3339(),
            transcript
        );
    }
}
