//! Message persistence and fan-out.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use parley_shared::protocol::{MessagePayload, ServerEvent};
use parley_shared::{ConversationRef, UserId};
use parley_store::{Conversation, Message, SharedDatabase, StoreError};

use crate::error::GatewayError;
use crate::registry::ConnectionRegistry;
use crate::resolver::ConversationResolver;

pub struct MessageRouter {
    db: SharedDatabase,
    registry: Arc<ConnectionRegistry>,
    resolver: ConversationResolver,
}

impl MessageRouter {
    pub fn new(
        db: SharedDatabase,
        registry: Arc<ConnectionRegistry>,
        resolver: ConversationResolver,
    ) -> Self {
        Self {
            db,
            registry,
            resolver,
        }
    }

    /// Persist `content` from `sender` and push it to every connected member,
    /// the sender included.
    ///
    /// Nothing is written unless the reference resolves and the sender is a
    /// member. Delivery happens only after the write has committed and is
    /// best-effort: members without a live connection pick the message up
    /// from history later.
    pub async fn send(
        &self,
        sender: UserId,
        reference: ConversationRef,
        content: String,
    ) -> Result<Message, GatewayError> {
        let conversation = self.resolver.resolve(reference, sender).await?;
        if !conversation.is_member(sender) {
            return Err(GatewayError::AccessDenied {
                user: sender,
                conversation: reference,
            });
        }

        let id = conversation.id;
        let message = self
            .db
            .call(move |db| db.append_message(id, sender, &content, Utc::now()))
            .await
            .map_err(|e| match e {
                // Membership changed between resolve and commit.
                StoreError::NotMember => GatewayError::AccessDenied {
                    user: sender,
                    conversation: reference,
                },
                other => other.into(),
            })?;

        let delivered = self.fan_out(&conversation, &message);
        debug!(
            conversation = %id,
            message_id = %message.id,
            sender = %sender,
            len = message.content.len(),
            delivered,
            "message routed"
        );
        Ok(message)
    }

    /// Queue `message` on the live connection of each member. Returns how
    /// many connections accepted it.
    fn fan_out(&self, conversation: &Conversation, message: &Message) -> usize {
        let payload = MessagePayload::from(message.clone());
        conversation
            .members
            .iter()
            .filter_map(|member| self.registry.lookup(*member))
            .filter(|conn| conn.deliver(ServerEvent::Message(payload.clone())))
            .count()
    }
}
