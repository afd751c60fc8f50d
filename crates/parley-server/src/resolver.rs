//! Conversation lookup and membership check.
//!
//! Every gateway operation that names a conversation goes through
//! [`ConversationResolver::resolve`] before touching messages or sockets.

use tracing::debug;

use parley_shared::{ConversationRef, UserId};
use parley_store::{Conversation, SharedDatabase, StoreError};

use crate::error::GatewayError;

#[derive(Clone)]
pub struct ConversationResolver {
    db: SharedDatabase,
}

impl ConversationResolver {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Resolve `reference` on behalf of `requester`.
    ///
    /// The self-notes reference yields the requester's own notes conversation,
    /// created on first use. A concrete id must exist (`NotFound`) and list
    /// the requester as a member (`AccessDenied`).
    pub async fn resolve(
        &self,
        reference: ConversationRef,
        requester: UserId,
    ) -> Result<Conversation, GatewayError> {
        match reference {
            ConversationRef::SelfNotes => Ok(self
                .db
                .call(move |db| db.get_or_create_self_notes(requester))
                .await?),
            ConversationRef::Concrete(id) => {
                let conversation = match self.db.call(move |db| db.get_conversation(id)).await {
                    Ok(c) => c,
                    Err(StoreError::NotFound) => {
                        debug!(user = %requester, conversation = %id, "conversation does not exist");
                        return Err(GatewayError::NotFound(format!("conversation {id}")));
                    }
                    Err(e) => return Err(GatewayError::Storage(e)),
                };

                if !conversation.is_member(requester) {
                    debug!(user = %requester, conversation = %id, "requester is not a member");
                    return Err(GatewayError::AccessDenied {
                        user: requester,
                        conversation: reference,
                    });
                }

                Ok(conversation)
            }
        }
    }
}
