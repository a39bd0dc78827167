//! JSON frames exchanged with customers and agents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::{CloseReason, Role};

/// Wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadJson,
    BadRequest,
    AgentPresent,
}

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Customer's mandatory first frame.
    #[serde(rename = "hello")]
    Hello,

    #[serde(rename = "message.send")]
    MessageSend {
        #[serde(rename = "conversationId", default)]
        conversation_id: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },

    #[serde(rename = "end")]
    End {
        #[serde(rename = "conversationId", default)]
        conversation_id: Option<String>,
    },
}

const CLIENT_FRAME_TYPES: &[&str] = &["hello", "message.send", "end"];

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("frame must be a JSON object")]
    NotObject,

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("invalid frame: {0}")]
    Invalid(String),
}

impl FrameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FrameError::Json(_) | FrameError::NotObject => ErrorCode::BadJson,
            FrameError::UnknownType(_) | FrameError::Invalid(_) => ErrorCode::BadRequest,
        }
    }

    /// The `error` frame reporting this failure back to the sender.
    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::error(self.code(), self.to_string())
    }
}

impl ClientFrame {
    /// Parse one inbound text frame.
    ///
    /// Unparseable text is a `BAD_JSON` failure; a well-formed object with an
    /// unknown or missing `type` is rejected explicitly.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(raw)?;
        let kind = match &value {
            Value::Object(map) => match map.get("type") {
                Some(Value::String(kind)) => kind.clone(),
                Some(other) => other.to_string(),
                None => "null".to_string(),
            },
            _ => return Err(FrameError::NotObject),
        };

        if !CLIENT_FRAME_TYPES.contains(&kind.as_str()) {
            return Err(FrameError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|e| FrameError::Invalid(e.to_string()))
    }

    /// The conversation a frame names, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ClientFrame::Hello => None,
            ClientFrame::MessageSend { conversation_id, .. }
            | ClientFrame::End { conversation_id } => conversation_id.as_deref(),
        }
    }
}

/// The other side of an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub role: Role,
    pub id: String,
}

/// A relayed chat message as seen by both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub sender_role: Role,
    pub content: String,
    pub ts: String,
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "ready")]
    Ready {
        role: Role,
        #[serde(rename = "conversationId")]
        conversation_id: Option<String>,
    },

    #[serde(rename = "queue.update")]
    QueueUpdate { position: usize },

    #[serde(rename = "assigned")]
    Assigned {
        #[serde(rename = "conversationId")]
        conversation_id: String,
        partner: Partner,
    },

    #[serde(rename = "message.new")]
    MessageNew { message: ChatMessage },

    #[serde(rename = "ended")]
    Ended {
        #[serde(rename = "conversationId")]
        conversation_id: String,
        reason: CloseReason,
    },

    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },
}

impl ServerFrame {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(ErrorCode::BadRequest, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_frames() {
        assert_eq!(ClientFrame::parse(r#"{"type":"hello"}"#).unwrap(), ClientFrame::Hello);

        assert_eq!(
            ClientFrame::parse(r#"{"type":"message.send","conversationId":"c1","content":"hi"}"#)
                .unwrap(),
            ClientFrame::MessageSend {
                conversation_id: Some("c1".to_string()),
                content: Some("hi".to_string()),
            }
        );

        assert_eq!(
            ClientFrame::parse(r#"{"type":"message.send","content":null}"#).unwrap(),
            ClientFrame::MessageSend {
                conversation_id: None,
                content: None,
            }
        );

        assert_eq!(
            ClientFrame::parse(r#"{"type":"end","conversationId":"c1"}"#).unwrap(),
            ClientFrame::End {
                conversation_id: Some("c1".to_string()),
            }
        );
    }

    #[test]
    fn test_conversation_id() {
        let end = ClientFrame::parse(r#"{"type":"end","conversationId":"c1"}"#).unwrap();
        assert_eq!(end.conversation_id(), Some("c1"));

        let send = ClientFrame::parse(r#"{"type":"message.send","content":"hi"}"#).unwrap();
        assert_eq!(send.conversation_id(), None);
        assert_eq!(ClientFrame::Hello.conversation_id(), None);
    }

    #[test]
    fn test_parse_failures() {
        let err = ClientFrame::parse("{not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadJson);

        let err = ClientFrame::parse("[1, 2]").unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadJson);

        let err = ClientFrame::parse(r#"{"type":"typing"}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert_eq!(err.to_string(), "unknown type: typing");

        let err = ClientFrame::parse(r#"{"content":"no type"}"#).unwrap_err();
        assert_eq!(err.to_string(), "unknown type: null");

        let err = ClientFrame::parse(r#"{"type":"message.send","content":42}"#).unwrap_err();
        assert!(matches!(err, FrameError::Invalid(_)));
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }

    #[test]
    fn test_server_frame_shapes() {
        let ready = ServerFrame::Ready {
            role: Role::Customer,
            conversation_id: None,
        };
        assert_eq!(
            serde_json::to_value(&ready).unwrap(),
            json!({"type": "ready", "role": "customer", "conversationId": null})
        );

        let assigned = ServerFrame::Assigned {
            conversation_id: "c1".to_string(),
            partner: Partner {
                role: Role::Agent,
                id: "agent-1".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&assigned).unwrap(),
            json!({"type": "assigned", "conversationId": "c1", "partner": {"role": "agent", "id": "agent-1"}})
        );

        let message = ServerFrame::MessageNew {
            message: ChatMessage {
                id: "m1".to_string(),
                conversation_id: "c1".to_string(),
                sender_role: Role::Agent,
                content: "hello".to_string(),
                ts: "2024-01-01T00:00:00+00:00".to_string(),
            },
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "message.new");
        assert_eq!(value["message"]["conversationId"], "c1");
        assert_eq!(value["message"]["sender_role"], "agent");

        let ended = ServerFrame::Ended {
            conversation_id: "c1".to_string(),
            reason: CloseReason::Left(Role::Customer),
        };
        assert_eq!(
            serde_json::to_value(&ended).unwrap(),
            json!({"type": "ended", "conversationId": "c1", "reason": "customer_left"})
        );

        let error = ServerFrame::error(ErrorCode::BadJson, "oops");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"type": "error", "code": "BAD_JSON", "message": "oops"})
        );
    }
}
