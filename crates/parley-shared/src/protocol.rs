//! JSON wire protocol spoken over the real-time socket.
//!
//! Every frame is a text frame holding `{"event": <name>, "data": <payload>}`.
//! Inbound frames are parsed into a validated [`ClientEvent`]; outbound
//! frames are produced from a [`ServerEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{ConversationId, ConversationRef, MessageId, UserId};

pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_FETCH_MESSAGES: &str = "fetchMessages";
pub const EVENT_FETCH_NEW_MESSAGES: &str = "fetchNewMessages";
pub const EVENT_FETCH_CONTACTS: &str = "fetchContacts";
pub const EVENT_GET_STATUS: &str = "getStatus";
pub const EVENT_GET_STATUSES: &str = "getStatuses";
pub const EVENT_CONTACT_STATUS: &str = "contactStatus";
pub const EVENT_USER_STATUSES: &str = "userStatuses";

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessageBody {
    conversation_ref: Option<ConversationRef>,
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FetchMessagesBody {
    conversation_ref: Option<ConversationRef>,
    page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatusBody {
    conversation_ref: Option<ConversationRef>,
}

/// A validated request from a connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Send `content` to every member of the referenced conversation.
    Message {
        conversation_ref: ConversationRef,
        content: String,
    },
    /// Fetch one page of history; page 0 is the newest block.
    FetchMessages {
        conversation_ref: ConversationRef,
        page: u32,
    },
    /// List the requester's most recently active conversations.
    FetchContacts,
    /// Online state of the other party of a conversation.
    GetStatus { conversation_ref: ConversationRef },
    /// Which of the requester's friends are currently connected.
    GetStatuses,
}

impl ClientEvent {
    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let data = match envelope.data {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };

        match envelope.event.as_str() {
            EVENT_MESSAGE => {
                let body: MessageBody = serde_json::from_value(data)?;
                let conversation_ref = body
                    .conversation_ref
                    .ok_or(ProtocolError::MissingField("conversationRef"))?;
                let content = body
                    .content
                    .filter(|c| !c.is_empty())
                    .ok_or(ProtocolError::MissingField("content"))?;
                Ok(ClientEvent::Message {
                    conversation_ref,
                    content,
                })
            }
            EVENT_FETCH_MESSAGES => {
                let body: FetchMessagesBody = serde_json::from_value(data)?;
                let conversation_ref = body
                    .conversation_ref
                    .ok_or(ProtocolError::MissingField("conversationRef"))?;
                Ok(ClientEvent::FetchMessages {
                    conversation_ref,
                    page: body.page.unwrap_or(0),
                })
            }
            EVENT_FETCH_CONTACTS => Ok(ClientEvent::FetchContacts),
            EVENT_GET_STATUS => {
                let body: StatusBody = serde_json::from_value(data)?;
                let conversation_ref = body
                    .conversation_ref
                    .ok_or(ProtocolError::MissingField("conversationRef"))?;
                Ok(ClientEvent::GetStatus { conversation_ref })
            }
            EVENT_GET_STATUSES => Ok(ClientEvent::GetStatuses),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Message { .. } => EVENT_MESSAGE,
            ClientEvent::FetchMessages { .. } => EVENT_FETCH_MESSAGES,
            ClientEvent::FetchContacts => EVENT_FETCH_CONTACTS,
            ClientEvent::GetStatus { .. } => EVENT_GET_STATUS,
            ClientEvent::GetStatuses => EVENT_GET_STATUSES,
        }
    }

    /// Encode back into a wire frame. Used by clients and tests.
    pub fn to_text(&self) -> String {
        let (event, data) = match self {
            ClientEvent::Message {
                conversation_ref,
                content,
            } => (
                EVENT_MESSAGE,
                serde_json::json!({
                    "conversationRef": i64::from(*conversation_ref),
                    "content": content,
                }),
            ),
            ClientEvent::FetchMessages {
                conversation_ref,
                page,
            } => (
                EVENT_FETCH_MESSAGES,
                serde_json::json!({
                    "conversationRef": i64::from(*conversation_ref),
                    "page": page,
                }),
            ),
            ClientEvent::FetchContacts => (EVENT_FETCH_CONTACTS, serde_json::json!({})),
            ClientEvent::GetStatus { conversation_ref } => (
                EVENT_GET_STATUS,
                serde_json::json!({ "conversationRef": i64::from(*conversation_ref) }),
            ),
            ClientEvent::GetStatuses => (EVENT_GET_STATUSES, serde_json::json!({})),
        };
        serde_json::json!({ "event": event, "data": data }).to_string()
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// A persisted message as delivered to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub content: String,
    pub owner_id: UserId,
    pub conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user. Carries no credential material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
    pub status: String,
    pub is_online: bool,
    pub last_online: Option<DateTime<Utc>>,
}

/// Conversation as listed by `fetchContacts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub owner_id: UserId,
    pub self_notes: bool,
    pub members: Vec<PublicUser>,
    pub message_count: i64,
    pub last_message: Option<String>,
}

/// Presence of a conversation peer. `last_online` is only sent while offline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactStatus {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_online: Option<DateTime<Utc>>,
}

impl ContactStatus {
    pub fn online() -> Self {
        Self {
            online: true,
            last_online: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "message")]
    Message(MessagePayload),

    /// Initial history load (page 0), newest first.
    #[serde(rename = "fetchMessages")]
    FetchMessages(Vec<MessagePayload>),

    /// Older history backfill (page >= 1), newest first.
    #[serde(rename = "fetchNewMessages")]
    FetchNewMessages(Vec<MessagePayload>),

    #[serde(rename = "fetchContacts")]
    FetchContacts(Vec<ConversationSummary>),

    #[serde(rename = "contactStatus")]
    ContactStatus(ContactStatus),

    #[serde(rename = "userStatuses")]
    UserStatuses(Vec<UserId>),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Message(_) => EVENT_MESSAGE,
            ServerEvent::FetchMessages(_) => EVENT_FETCH_MESSAGES,
            ServerEvent::FetchNewMessages(_) => EVENT_FETCH_NEW_MESSAGES,
            ServerEvent::FetchContacts(_) => EVENT_FETCH_CONTACTS,
            ServerEvent::ContactStatus(_) => EVENT_CONTACT_STATUS,
            ServerEvent::UserStatuses(_) => EVENT_USER_STATUSES,
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
