//! Online/offline tracking.
//!
//! Registry transitions and the durable `is_online` / `last_online` columns
//! move together: each user's admit+write and evict+write pairs run under a
//! per-user async lock, so a reconnect racing a disconnect cannot leave the
//! stored flag out of step with the registry.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use parley_shared::protocol::{ContactStatus, ServerEvent};
use parley_shared::{ConversationRef, UserId};
use parley_store::SharedDatabase;

use crate::error::GatewayError;
use crate::registry::{Admission, ConnectionRegistry, LiveConnection, Session};
use crate::resolver::ConversationResolver;

pub struct PresenceTracker {
    db: SharedDatabase,
    registry: Arc<ConnectionRegistry>,
    resolver: ConversationResolver,
    transitions: DashMap<UserId, Arc<Mutex<()>>>,
}

impl PresenceTracker {
    pub fn new(
        db: SharedDatabase,
        registry: Arc<ConnectionRegistry>,
        resolver: ConversationResolver,
    ) -> Self {
        Self {
            db,
            registry,
            resolver,
            transitions: DashMap::new(),
        }
    }

    async fn lock(&self, user: UserId) -> OwnedMutexGuard<()> {
        let mutex = self.transitions.entry(user).or_default().clone();
        mutex.lock_owned().await
    }

    /// Drop `user`'s transition lock once nobody else holds or waits on it.
    fn release(&self, user: UserId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.transitions
            .remove_if(&user, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    /// Admit `connection` and mark its user online.
    ///
    /// On success the connection receives `contactStatus {online: true}`.
    /// A replacement keeps the stored flag as it is, since the user never
    /// went offline. If the online write fails the connection is evicted
    /// again and the error returned.
    pub async fn on_connect(
        &self,
        connection: &LiveConnection,
    ) -> Result<Admission, GatewayError> {
        let user = connection.user_id();
        let session = connection.session().id;
        let guard = self.lock(user).await;

        let admission = self.registry.admit(connection.clone());
        let outcome = match admission {
            Admission::Rejected => Ok(Admission::Rejected),
            Admission::Replaced(_) => Ok(admission),
            Admission::Accepted => match self.db.call(move |db| db.mark_online(user)).await {
                Ok(true) => Ok(Admission::Accepted),
                Ok(false) => {
                    self.registry.evict(user, session);
                    Err(GatewayError::AuthenticationFailed(format!("unknown user {user}")))
                }
                Err(e) => {
                    self.registry.evict(user, session);
                    Err(GatewayError::Storage(e))
                }
            },
        };

        self.release(user, guard);

        if let Ok(Admission::Accepted | Admission::Replaced(_)) = &outcome {
            info!(user = %user, session = %session, "user online");
            connection.deliver(ServerEvent::ContactStatus(ContactStatus::online()));
        }
        outcome
    }

    /// Evict `session` and mark its user offline.
    ///
    /// Returns `false` when the session had already been replaced or evicted;
    /// nothing is written in that case. The eviction stands even if the
    /// offline write fails.
    pub async fn on_disconnect(&self, session: &Session) -> bool {
        let user = session.user_id;
        let guard = self.lock(user).await;

        let evicted = self.registry.evict(user, session.id);
        if evicted {
            let at = Utc::now();
            match self.db.call(move |db| db.mark_offline(user, at)).await {
                Ok(_) => info!(user = %user, session = %session.id, "user offline"),
                Err(e) => error!(user = %user, error = %e, "failed to record offline status"),
            }
        } else {
            debug!(user = %user, session = %session.id, "session already superseded");
        }

        self.release(user, guard);
        evicted
    }

    /// Presence of the other party of `reference`, as seen by `requester`.
    ///
    /// Direct chats report the peer's registry state, plus `last_online`
    /// while the peer is offline. Self-notes report the requester, who is
    /// connected by definition. Groups report whether any other member is
    /// connected.
    pub async fn query_status(
        &self,
        reference: ConversationRef,
        requester: UserId,
    ) -> Result<ContactStatus, GatewayError> {
        let conversation = self.resolver.resolve(reference, requester).await?;

        if conversation.is_self_notes() {
            return Ok(ContactStatus::online());
        }

        let Some(peer) = conversation.other_member(requester) else {
            let online = conversation
                .members
                .iter()
                .any(|m| *m != requester && self.registry.is_online(*m));
            return Ok(ContactStatus {
                online,
                last_online: None,
            });
        };

        if self.registry.is_online(peer) {
            return Ok(ContactStatus::online());
        }

        let last_online = match self.db.call(move |db| db.get_user(peer)).await {
            Ok(user) => user.last_online,
            Err(e) => {
                warn!(user = %peer, error = %e, "peer row unavailable for status query");
                return Err(e.into());
            }
        };

        Ok(ContactStatus {
            online: false,
            last_online,
        })
    }

    /// Friends of `requester` that currently hold a live connection, in the
    /// order they were befriended.
    pub async fn online_friends(&self, requester: UserId) -> Result<Vec<UserId>, GatewayError> {
        let friends = self.db.call(move |db| db.list_friends(requester)).await?;
        Ok(friends
            .into_iter()
            .filter(|f| self.registry.is_online(*f))
            .collect())
    }
}
