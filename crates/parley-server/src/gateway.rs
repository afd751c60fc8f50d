//! The real-time gateway: admission, event dispatch and teardown for one
//! authenticated socket at a time.
//!
//! Socket I/O lives in [`crate::socket`]; everything here talks to a
//! [`LiveConnection`], which makes the whole flow testable with plain
//! channels.

use std::sync::Arc;

use tracing::{debug, warn};

use parley_shared::constants::CONTACTS_LIMIT;
use parley_shared::protocol::{ClientEvent, ConversationSummary, ServerEvent};
use parley_shared::{ConversationRef, UserId};
use parley_store::{Conversation, SharedDatabase, User};

use crate::error::GatewayError;
use crate::history::HistoryPaginator;
use crate::presence::PresenceTracker;
use crate::registry::{Admission, ConnectionRegistry, LiveConnection, Session};
use crate::resolver::ConversationResolver;
use crate::router::MessageRouter;

pub struct Gateway {
    db: SharedDatabase,
    registry: Arc<ConnectionRegistry>,
    resolver: ConversationResolver,
    presence: PresenceTracker,
    router: MessageRouter,
    history: HistoryPaginator,
}

impl Gateway {
    pub fn new(db: SharedDatabase, registry: Arc<ConnectionRegistry>) -> Self {
        let resolver = ConversationResolver::new(db.clone());
        Self {
            presence: PresenceTracker::new(db.clone(), registry.clone(), resolver.clone()),
            router: MessageRouter::new(db.clone(), registry.clone(), resolver.clone()),
            history: HistoryPaginator::new(db.clone(), resolver.clone()),
            resolver,
            registry,
            db,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Admit a freshly authenticated connection. No event from it may be
    /// handled before this returns `Accepted` or `Replaced`.
    pub async fn connect(&self, connection: &LiveConnection) -> Result<Admission, GatewayError> {
        self.presence.on_connect(connection).await
    }

    /// Tear down `session`. Safe to call more than once.
    pub async fn disconnect(&self, session: &Session) {
        self.presence.on_disconnect(session).await;
    }

    /// Handle one client event. Replies go to `connection` only; message
    /// fan-out goes through the registry.
    pub async fn handle(
        &self,
        connection: &LiveConnection,
        event: &ClientEvent,
    ) -> Result<(), GatewayError> {
        let user = connection.user_id();
        debug!(user = %user, event = event.name(), "client event");

        match event {
            ClientEvent::Message {
                conversation_ref,
                content,
            } => {
                self.router
                    .send(user, *conversation_ref, content.clone())
                    .await?;
            }
            ClientEvent::FetchMessages {
                conversation_ref,
                page,
            } => {
                let page = self.history.fetch(user, *conversation_ref, *page).await?;
                connection.deliver(page.into_event());
            }
            ClientEvent::FetchContacts => {
                let contacts = self.contacts(user).await?;
                connection.deliver(ServerEvent::FetchContacts(contacts));
            }
            ClientEvent::GetStatus { conversation_ref } => {
                let status = self.presence.query_status(*conversation_ref, user).await?;
                connection.deliver(ServerEvent::ContactStatus(status));
            }
            ClientEvent::GetStatuses => {
                let online = self.presence.online_friends(user).await?;
                connection.deliver(ServerEvent::UserStatuses(online));
            }
        }
        Ok(())
    }

    /// The requester's most recently active conversations, at most
    /// [`CONTACTS_LIMIT`], with member profiles attached.
    pub async fn contacts(&self, user: UserId) -> Result<Vec<ConversationSummary>, GatewayError> {
        let summaries = self
            .db
            .call(move |db| {
                let conversations = db.list_conversations_for_user(user, CONTACTS_LIMIT)?;
                let mut summaries = Vec::with_capacity(conversations.len());
                for conversation in &conversations {
                    let members = db.get_users(&conversation.members)?;
                    summaries.push(conversation.summarize(&members));
                }
                Ok(summaries)
            })
            .await?;
        Ok(summaries)
    }

    /// Summary of one conversation the requester belongs to.
    pub async fn conversation_summary(
        &self,
        reference: ConversationRef,
        requester: UserId,
    ) -> Result<ConversationSummary, GatewayError> {
        let conversation = self.resolver.resolve(reference, requester).await?;
        let members = self.member_profiles(&conversation).await?;
        Ok(conversation.summarize(&members))
    }

    async fn member_profiles(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<User>, GatewayError> {
        let ids = conversation.members.clone();
        let users = self.db.call(move |db| db.get_users(&ids)).await?;
        if users.len() != conversation.members.len() {
            warn!(
                conversation = %conversation.id,
                expected = conversation.members.len(),
                found = users.len(),
                "conversation lists members without a user row"
            );
        }
        Ok(users)
    }
}
