use serde::{Deserialize, Serialize};

use crate::constants::{SELF_NOTES_REF, SYSTEM_USER_ID};

// Users are identified by the integer primary key issued at registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Owner of every self-notes conversation. Never a real account.
    pub const SYSTEM: UserId = UserId(SYSTEM_USER_ID);

    pub fn is_system(&self) -> bool {
        *self == Self::SYSTEM
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client-supplied conversation reference.
///
/// On the wire this is a plain integer; `0` is reserved and means "the
/// requester's own self-notes conversation". Every other value names a
/// concrete conversation row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "i64", into = "i64")]
pub enum ConversationRef {
    Concrete(ConversationId),
    SelfNotes,
}

impl From<i64> for ConversationRef {
    fn from(raw: i64) -> Self {
        if raw == SELF_NOTES_REF {
            ConversationRef::SelfNotes
        } else {
            ConversationRef::Concrete(ConversationId(raw))
        }
    }
}

impl From<ConversationRef> for i64 {
    fn from(r: ConversationRef) -> Self {
        match r {
            ConversationRef::Concrete(id) => id.0,
            ConversationRef::SelfNotes => SELF_NOTES_REF,
        }
    }
}

impl std::fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationRef::Concrete(id) => write!(f, "{id}"),
            ConversationRef::SelfNotes => f.write_str("self-notes"),
        }
    }
}

impl std::str::FromStr for ConversationRef {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(ConversationRef::from)
    }
}
