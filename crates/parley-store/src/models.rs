//! Domain model structs persisted in the SQLite database.
//!
//! [`Conversation`] and [`Message`] derive `Serialize`/`Deserialize`.
//! [`User`] deliberately does not: it carries the password hash, and the only
//! way to put a user on the wire is through [`PublicUser`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_shared::protocol::{ConversationSummary, MessagePayload, PublicUser};
use parley_shared::types::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    /// Free-form profile status chosen by the user.
    pub status: String,
    /// Credential hash written by the registration service. Never leaves the
    /// store except for credential checks.
    pub password_hash: String,
    pub is_online: bool,
    /// Last time the user went offline. Stale while `is_online` is set.
    pub last_online: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("is_online", &self.is_online)
            .field("last_online", &self.last_online)
            .finish_non_exhaustive()
    }
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        PublicUser {
            id: u.id,
            username: u.username.clone(),
            avatar: u.avatar.clone(),
            status: u.status.clone(),
            is_online: u.is_online,
            last_online: u.last_online,
        }
    }
}

/// Fields supplied by registration when creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub password_hash: String,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A direct chat, a group, or a user's self-notes conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub name: Option<String>,
    pub avatar: Option<String>,
    /// Creator, or [`UserId::SYSTEM`] for self-notes.
    pub owner_id: UserId,
    /// Set only on a self-notes conversation: the user it belongs to.
    pub self_notes_for: Option<UserId>,
    /// Member ids in ascending order.
    pub members: Vec<UserId>,
    pub message_count: i64,
    /// Content of the most recent message.
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    pub fn is_self_notes(&self) -> bool {
        self.self_notes_for.is_some()
    }

    /// The other participant of a two-party conversation.
    ///
    /// Returns `None` for groups, self-notes, or when `me` is not a member.
    pub fn other_member(&self, me: UserId) -> Option<UserId> {
        match self.members.as_slice() {
            [a, b] if *a == me => Some(*b),
            [a, b] if *b == me => Some(*a),
            _ => None,
        }
    }

    /// Build the wire summary from resolved member rows.
    pub fn summarize(&self, members: &[User]) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            owner_id: self.owner_id,
            self_notes: self.is_self_notes(),
            members: members.iter().map(PublicUser::from).collect(),
            message_count: self.message_count,
            last_message: self.last_message.clone(),
        }
    }
}

/// Fields supplied by the contact/group creation flow.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub owner_id: UserId,
    pub name: Option<String>,
    pub avatar: Option<String>,
    /// Participants other than the owner. The owner is always added.
    pub members: Vec<UserId>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    /// Sender.
    pub owner_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessagePayload {
    fn from(m: Message) -> Self {
        MessagePayload {
            id: m.id,
            content: m.content,
            owner_id: m.owner_id,
            conversation_id: m.conversation_id,
            created_at: m.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(members: Vec<UserId>) -> Conversation {
        Conversation {
            id: ConversationId(1),
            name: None,
            avatar: None,
            owner_id: members[0],
            self_notes_for: None,
            members,
            message_count: 0,
            last_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn other_member_of_direct_chat() {
        let c = conversation(vec![UserId(7), UserId(9)]);
        assert_eq!(c.other_member(UserId(7)), Some(UserId(9)));
        assert_eq!(c.other_member(UserId(9)), Some(UserId(7)));
        assert_eq!(c.other_member(UserId(3)), None);
    }

    #[test]
    fn other_member_of_group_is_none() {
        let c = conversation(vec![UserId(1), UserId(2), UserId(3)]);
        assert_eq!(c.other_member(UserId(1)), None);
    }

    #[test]
    fn debug_hides_password_hash() {
        let user = User {
            id: UserId(1),
            username: "ada".into(),
            email: None,
            avatar: None,
            status: "default".into(),
            password_hash: "$argon2id$secret".into(),
            is_online: false,
            last_online: None,
            created_at: Utc::now(),
        };
        assert!(!format!("{user:?}").contains("secret"));

        let public = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(!public.contains("secret"));
        assert!(!public.contains("password"));
    }
}
