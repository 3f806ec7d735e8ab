use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message kinds carried in the envelope's `type` field.
///
/// Unknown kinds are kept as [`MessageType::Other`] so they can take the
/// default broadcast path instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    CodeUpdate,
    UserJoined,
    UserLeft,
    AgentRequest,
    AgentResponse,
    ChatMessage,
    Error,
    Ping,
    Pong,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::CodeUpdate => "code_update",
            MessageType::UserJoined => "user_joined",
            MessageType::UserLeft => "user_left",
            MessageType::AgentRequest => "agent_request",
            MessageType::AgentResponse => "agent_response",
            MessageType::ChatMessage => "chat_message",
            MessageType::Error => "error",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Other(other) => other,
        }
    }

    /// Kinds only the server may emit.
    pub fn is_server_only(&self) -> bool {
        matches!(
            self,
            MessageType::UserJoined
                | MessageType::UserLeft
                | MessageType::AgentResponse
                | MessageType::Error
                | MessageType::Pong
        )
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "code_update" => MessageType::CodeUpdate,
            "user_joined" => MessageType::UserJoined,
            "user_left" => MessageType::UserLeft,
            "agent_request" => MessageType::AgentRequest,
            "agent_response" => MessageType::AgentResponse,
            "chat_message" => MessageType::ChatMessage,
            "error" => MessageType::Error,
            "ping" => MessageType::Ping,
            "pong" => MessageType::Pong,
            _ => MessageType::Other(value),
        }
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope shared by every message.
///
/// `client_id` identifies the sending connection inside the hub and is never
/// serialized to peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub session_id: String,
    #[serde(skip)]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new<P: Serialize>(
        kind: MessageType,
        session_id: &str,
        user_id: Option<&str>,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind,
            session_id: session_id.to_string(),
            client_id: String::new(),
            user_id: user_id.map(str::to_string),
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn parse_payload<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CodeUpdatePayload {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_col: Option<u32>,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserJoinedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserLeftPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentRequestPayload {
    pub user_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_state: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation_history: Vec<ConversationTurn>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentResponsePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub docs_retrieved: u32,
    pub examples_retrieved: u32,
    pub model: String,
    pub is_actionable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clarifying_questions: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessagePayload {
    pub message: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub error_code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PongPayload {
    pub date: String,
}
