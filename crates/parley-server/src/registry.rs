//! In-memory map of authenticated users to their live socket.
//!
//! Each entry holds the per-connection [`Session`] record created at
//! admission and the sending half of that socket's outbound queue. The map
//! is a [`DashMap`], so admits and evicts for one user only contend with
//! other users on the same shard.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_shared::constants::OUTBOUND_QUEUE_CAPACITY;
use parley_shared::protocol::ServerEvent;
use parley_shared::UserId;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Which connection survives when a user connects twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// The new connection replaces the old one, which is closed.
    #[default]
    LastWins,
    /// The existing connection stays; the new one is closed.
    FirstWins,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-wins" | "last_wins" => Ok(DuplicatePolicy::LastWins),
            "first-wins" | "first_wins" => Ok(DuplicatePolicy::FirstWins),
            other => Err(format!("unknown duplicate connection policy: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Immutable per-connection state, fixed at admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
}

/// Why the gateway is closing a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A newer connection for the same user took over.
    Replaced,
    /// The user already has a connection and the policy keeps it.
    Duplicate,
    /// The client sent an invalid frame.
    PolicyViolation,
    /// A storage failure left the connection unable to continue.
    InternalError,
}

impl CloseReason {
    /// WebSocket close code (RFC 6455 section 7.4.1).
    pub fn code(self) -> u16 {
        match self {
            CloseReason::Replaced | CloseReason::Duplicate => 1000,
            CloseReason::PolicyViolation => 1008,
            CloseReason::InternalError => 1011,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Replaced => "replaced by a newer connection",
            CloseReason::Duplicate => "already connected",
            CloseReason::PolicyViolation => "invalid frame",
            CloseReason::InternalError => "internal error",
        }
    }
}

/// Items queued for a socket's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerEvent),
    Close(CloseReason),
}

/// Receiving half of a connection's outbound queue, drained by its writer.
pub type OutboundQueue = mpsc::Receiver<Outbound>;

/// Handle to one live socket: its session record and outbound queue.
///
/// The queue holds at most [`OUTBOUND_QUEUE_CAPACITY`] items. A socket whose
/// queue fills up is flagged as lagging and its owner tears it down.
#[derive(Debug, Clone)]
pub struct LiveConnection {
    session: Session,
    outbound: mpsc::Sender<Outbound>,
    lagged: Arc<Notify>,
}

impl LiveConnection {
    /// Create a connection for `user_id` and the queue its writer drains.
    pub fn open(user_id: UserId) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            connected_at: Utc::now(),
        };
        (
            Self {
                session,
                outbound: tx,
                lagged: Arc::new(Notify::new()),
            },
            rx,
        )
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user_id(&self) -> UserId {
        self.session.user_id
    }

    /// Queue an event without waiting.
    ///
    /// Returns `false` once the writer has gone, or when the queue is full;
    /// the latter also flags the connection as lagging.
    pub fn deliver(&self, event: ServerEvent) -> bool {
        self.enqueue(Outbound::Event(event))
    }

    /// Ask the writer to send a close frame and stop.
    pub fn close(&self, reason: CloseReason) {
        self.enqueue(Outbound::Close(reason));
    }

    /// Resolves once a delivery found the queue full. Stays resolved for
    /// the next caller if nobody was waiting at the time.
    pub async fn lagging(&self) {
        self.lagged.notified().await;
    }

    fn enqueue(&self, item: Outbound) -> bool {
        match self.outbound.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    user = %self.session.user_id,
                    session = %self.session.id,
                    "outbound queue full, dropping connection"
                );
                self.lagged.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Outcome of [`ConnectionRegistry::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No previous connection; the new one is registered.
    Accepted,
    /// The new connection replaced the previous session, which was closed.
    Replaced(Session),
    /// The user is already connected and the new connection was closed.
    Rejected,
}

/// At most one live connection per user.
pub struct ConnectionRegistry {
    connections: DashMap<UserId, LiveConnection>,
    policy: DuplicatePolicy,
}

impl ConnectionRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            connections: DashMap::new(),
            policy,
        }
    }

    /// Register `connection` for its user according to the policy.
    ///
    /// The check, the insert and the close of the losing connection happen
    /// under the entry's shard lock, so two admits for one user cannot both
    /// end up registered.
    pub fn admit(&self, connection: LiveConnection) -> Admission {
        let user = connection.user_id();

        match self.connections.entry(user) {
            Entry::Vacant(slot) => {
                debug!(user = %user, session = %connection.session.id, "connection admitted");
                slot.insert(connection);
                Admission::Accepted
            }
            Entry::Occupied(mut slot) => match self.policy {
                DuplicatePolicy::LastWins => {
                    let previous = slot.insert(connection);
                    previous.close(CloseReason::Replaced);
                    info!(
                        user = %user,
                        previous = %previous.session.id,
                        session = %slot.get().session.id,
                        "connection replaced"
                    );
                    Admission::Replaced(previous.session)
                }
                DuplicatePolicy::FirstWins => {
                    connection.close(CloseReason::Duplicate);
                    info!(
                        user = %user,
                        rejected = %connection.session.id,
                        "duplicate connection rejected"
                    );
                    Admission::Rejected
                }
            },
        }
    }

    /// Remove `user`'s entry if it still belongs to `session`.
    ///
    /// Returns `true` when an entry was removed. Evicting an absent user, or
    /// with a session that has since been replaced, is a no-op.
    pub fn evict(&self, user: UserId, session: Uuid) -> bool {
        let removed = self
            .connections
            .remove_if(&user, |_, conn| conn.session.id == session)
            .is_some();
        if removed {
            debug!(user = %user, session = %session, "connection evicted");
        }
        removed
    }

    pub fn lookup(&self, user: UserId) -> Option<LiveConnection> {
        self.connections.get(&user).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.connections.contains_key(&user)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }
}
