//! Per-socket tasks.
//!
//! Each upgraded socket is split into a writer task that drains the
//! connection's outbound queue and a reader task that parses frames and hands
//! them to the [`Gateway`] one at a time, so a client's own events are
//! handled in the order it sent them.
//!
//! The reader is never aborted mid-event. When the writer goes away it is
//! asked to stop, and it only checks for that between frames, so a message
//! that has been stored is always fanned out.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use parley_shared::protocol::ClientEvent;
use parley_shared::UserId;

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::registry::{Admission, CloseReason, LiveConnection, Outbound};

/// How long a closing socket gets to flush queued frames.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Which side of the socket stopped first.
enum Ended {
    Writer,
    Reader,
    Lagging,
}

/// Drive one authenticated socket until either side closes it.
pub async fn run(socket: WebSocket, gateway: Arc<Gateway>, user: UserId) {
    let (connection, mut outbound) = LiveConnection::open(user);
    let session = connection.session().clone();
    let (mut ws_tx, ws_rx) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Event(event) => {
                    let text = match event.to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            error!(event = event.name(), error = %e, "failed to encode event");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(reason) => {
                    let frame = CloseFrame {
                        code: reason.code(),
                        reason: Cow::Borrowed(reason.as_str()),
                    };
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    match gateway.connect(&connection).await {
        Ok(Admission::Accepted) => {}
        Ok(Admission::Replaced(previous)) => {
            debug!(user = %user, previous = %previous.id, "took over from previous session");
        }
        Ok(Admission::Rejected) => {
            drop(connection);
            finish_writer(send_task).await;
            return;
        }
        Err(e) => {
            warn!(user = %user, error = %e, "connection admission failed");
            connection.close(close_reason(&e));
            drop(connection);
            finish_writer(send_task).await;
            return;
        }
    }

    let shutdown = Arc::new(Notify::new());
    let mut recv_task = tokio::spawn(read_frames(
        ws_rx,
        gateway.clone(),
        connection.clone(),
        shutdown.clone(),
    ));

    let ended = tokio::select! {
        _ = &mut send_task => Ended::Writer,
        _ = &mut recv_task => Ended::Reader,
        _ = connection.lagging() => Ended::Lagging,
    };

    if let Ended::Lagging = ended {
        // The writer is stuck on a peer that stopped reading.
        send_task.abort();
    }
    if !matches!(ended, Ended::Reader) {
        shutdown.notify_one();
        if let Err(e) = recv_task.await {
            error!(user = %user, error = %e, "reader task failed");
        }
    }

    gateway.disconnect(&session).await;
    drop(connection);
    if !send_task.is_finished() {
        finish_writer(send_task).await;
    }
    let connected_for = chrono::Utc::now() - session.connected_at;
    info!(
        user = %user,
        session = %session.id,
        secs = connected_for.num_seconds(),
        "socket closed"
    );
}

/// Parse and handle frames until the client closes, a frame closes the
/// connection, or `shutdown` fires. The event in progress always runs to
/// completion.
async fn read_frames<S>(
    mut frames: S,
    gateway: Arc<Gateway>,
    connection: LiveConnection,
    shutdown: Arc<Notify>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let user = connection.user_id();

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            frame = frames.next() => frame,
        };
        let Some(Ok(frame)) = frame else { break };

        match frame {
            Message::Text(text) => {
                let event = match ClientEvent::from_text(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(user = %user, error = %e, "invalid frame, closing connection");
                        connection.close(CloseReason::PolicyViolation);
                        break;
                    }
                };

                if let Err(e) = gateway.handle(&connection, &event).await {
                    report(user, &event, &e);
                    if e.closes_connection(&event) {
                        connection.close(close_reason(&e));
                        break;
                    }
                }
            }
            Message::Binary(_) => {
                warn!(user = %user, "binary frame, closing connection");
                connection.close(CloseReason::PolicyViolation);
                break;
            }
            Message::Close(_) => break,
            // Pings are answered by the WebSocket layer.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

/// Wait for the writer to flush and exit, giving up after [`CLOSE_GRACE`].
async fn finish_writer(mut task: JoinHandle<()>) {
    if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
        debug!("writer did not drain in time, aborting");
        task.abort();
    }
}

fn close_reason(err: &GatewayError) -> CloseReason {
    match err {
        GatewayError::Storage(_) => CloseReason::InternalError,
        _ => CloseReason::PolicyViolation,
    }
}

/// Log a failed operation. Not-found and access-denied look identical to the
/// client but stay distinguishable here.
fn report(user: UserId, event: &ClientEvent, err: &GatewayError) {
    match err {
        GatewayError::NotFound(what) => {
            debug!(
                user = %user,
                event = event.name(),
                missing = %what,
                "operation aborted: not found"
            );
        }
        GatewayError::AccessDenied { conversation, .. } => {
            warn!(
                user = %user,
                event = event.name(),
                conversation = %conversation,
                "operation aborted: access denied"
            );
        }
        GatewayError::Storage(e) => {
            error!(
                user = %user,
                event = event.name(),
                error = %e,
                "operation aborted: storage failure"
            );
        }
        other => {
            warn!(
                user = %user,
                event = event.name(),
                kind = other.kind(),
                error = %other,
                "operation failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionRegistry, DuplicatePolicy, OutboundQueue};
    use crate::testutil::TestStore;
    use parley_shared::protocol::ServerEvent;
    use parley_shared::{ConversationRef, ProtocolError};
    use parley_store::StoreError;

    async fn connect(gateway: &Gateway, user: UserId) -> (LiveConnection, OutboundQueue) {
        let (conn, mut rx) = LiveConnection::open(user);
        gateway.connect(&conn).await.unwrap();
        assert!(rx.try_recv().is_ok());
        (conn, rx)
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_message_fan_out() {
        let store = TestStore::new();
        let ada = store.user("ada").await;
        let bob = store.user("bob").await;
        let id = store.conversation(ada, &[bob]).await;

        let registry = Arc::new(ConnectionRegistry::new(DuplicatePolicy::LastWins));
        let gateway = Arc::new(Gateway::new(store.db.clone(), registry));
        let (ada_conn, _ada_rx) = connect(&gateway, ada).await;
        let (_bob_conn, mut bob_rx) = connect(&gateway, bob).await;

        // Hold the database so the message stalls inside the gateway.
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate = tokio::spawn({
            let db = store.db.clone();
            async move {
                db.call(move |_db| {
                    let _ = entered_tx.send(());
                    let _ = gate_rx.recv();
                    Ok(())
                })
                .await
            }
        });
        entered_rx.await.unwrap();

        let text = ClientEvent::Message {
            conversation_ref: ConversationRef::Concrete(id),
            content: "hi".into(),
        }
        .to_text();
        let pulled = Arc::new(Notify::new());
        let signal = pulled.clone();
        let frames = Box::pin(
            futures::stream::iter(vec![Ok::<_, axum::Error>(Message::Text(text))])
                .inspect(move |_| signal.notify_one())
                .chain(futures::stream::pending()),
        );

        let shutdown = Arc::new(Notify::new());
        let reader = tokio::spawn(read_frames(
            frames,
            gateway.clone(),
            ada_conn,
            shutdown.clone(),
        ));

        pulled.notified().await;
        shutdown.notify_one();
        gate_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("reader stops once shutdown is signalled")
            .unwrap();
        gate.await.unwrap().unwrap();

        assert_eq!(store.message_count(id).await, 1);
        match bob_rx.try_recv().unwrap() {
            Outbound::Event(ServerEvent::Message(payload)) => {
                assert_eq!(payload.content, "hi");
                assert_eq!(payload.owner_id, ada);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_reader() {
        let store = TestStore::new();
        let ada = store.user("ada").await;
        let registry = Arc::new(ConnectionRegistry::new(DuplicatePolicy::LastWins));
        let gateway = Arc::new(Gateway::new(store.db.clone(), registry));
        let (conn, _rx) = connect(&gateway, ada).await;

        let shutdown = Arc::new(Notify::new());
        shutdown.notify_one();
        let frames = Box::pin(futures::stream::pending::<Result<Message, axum::Error>>());

        tokio::time::timeout(
            Duration::from_secs(5),
            read_frames(frames, gateway, conn, shutdown),
        )
        .await
        .expect("idle reader stops on shutdown");
    }

    #[test]
    fn test_storage_failures_close_as_internal_error() {
        assert_eq!(
            close_reason(&GatewayError::Storage(StoreError::Poisoned)),
            CloseReason::InternalError
        );
        assert_eq!(
            close_reason(&GatewayError::ValidationFailed(ProtocolError::MissingField(
                "content"
            ))),
            CloseReason::PolicyViolation
        );
    }
}
