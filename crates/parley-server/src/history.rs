//! Paged reads of a conversation's message log.

use parley_shared::constants::PAGE_SIZE;
use parley_shared::protocol::{MessagePayload, ServerEvent};
use parley_shared::{ConversationRef, UserId};
use parley_store::{Message, SharedDatabase};

use crate::error::GatewayError;
use crate::resolver::ConversationResolver;

/// One page of history, newest message first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub page: u32,
    pub messages: Vec<Message>,
}

impl HistoryPage {
    /// Page 0 is the initial load (`fetchMessages`); later pages are
    /// backfill (`fetchNewMessages`).
    pub fn into_event(self) -> ServerEvent {
        let payload: Vec<MessagePayload> = self.messages.into_iter().map(Into::into).collect();
        if self.page == 0 {
            ServerEvent::FetchMessages(payload)
        } else {
            ServerEvent::FetchNewMessages(payload)
        }
    }
}

#[derive(Clone)]
pub struct HistoryPaginator {
    db: SharedDatabase,
    resolver: ConversationResolver,
}

impl HistoryPaginator {
    pub fn new(db: SharedDatabase, resolver: ConversationResolver) -> Self {
        Self { db, resolver }
    }

    /// Fetch page `page` (zero-based, [`PAGE_SIZE`] messages each) of the
    /// referenced conversation.
    ///
    /// Existence and membership are checked before the log is read, so an
    /// empty page always means an empty range.
    pub async fn fetch(
        &self,
        requester: UserId,
        reference: ConversationRef,
        page: u32,
    ) -> Result<HistoryPage, GatewayError> {
        let conversation = self.resolver.resolve(reference, requester).await?;
        if !conversation.is_member(requester) {
            return Err(GatewayError::AccessDenied {
                user: requester,
                conversation: reference,
            });
        }

        let id = conversation.id;
        let offset = page.saturating_mul(PAGE_SIZE);
        let messages = self
            .db
            .call(move |db| db.get_messages_for_conversation(id, PAGE_SIZE, offset))
            .await?;

        tracing::debug!(
            user = %requester,
            conversation = %id,
            page,
            count = messages.len(),
            "history page served"
        );
        Ok(HistoryPage { page, messages })
    }
}
