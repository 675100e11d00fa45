//! Transport session task with a tokio mpsc command/event pattern.
//!
//! The session owns one [`PushLink`] connection and runs in a dedicated
//! task. External code talks to it through a typed command channel and
//! receives everything — connection state changes and inbound frames —
//! through a single ordered event channel, so consumers never observe
//! frames out of delivery order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use parley_shared::constants::{COMMAND_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY};

use crate::error::{NetError, Result};
use crate::link::PushLink;

/// Opaque token for one active subscription. Issued by the session task,
/// owned by exactly one caller, released at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Commands sent *into* the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Subscribe to a topic; the issued handle is returned on the reply
    /// channel once the link has accepted the subscription.
    Subscribe {
        topic: String,
        reply: oneshot::Sender<Result<SubscriptionHandle>>,
    },
    /// Release a subscription handle. Releasing an already-released handle
    /// is a logged no-op.
    Unsubscribe(SubscriptionHandle),
    /// Fire-and-forget publish to a destination.
    Send {
        destination: String,
        payload: Vec<u8>,
    },
    /// Gracefully tear down the connection and end the task.
    Shutdown,
}

/// Events sent *from* the session task, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The channel is established. Fires once per successful connection;
    /// all base subscriptions must be (re)established by the consumer on
    /// this event, because a reconnect invalidates prior subscriptions.
    Connected,
    /// A payload arrived on a subscribed topic.
    Frame { topic: String, payload: Vec<u8> },
    /// The channel is gone. All subscription handles are now invalid.
    Disconnected { reason: String },
}

/// Configuration for spawning a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the command channel.
    pub command_capacity: usize,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_capacity: COMMAND_CHANNEL_CAPACITY,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Cloneable handle to a running session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    connected: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Whether the channel is currently established. Cheap enough for the
    /// outbound dispatcher to consult before every send attempt.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to a topic and receive its handle.
    pub async fn subscribe(&self, topic: &str) -> Result<SubscriptionHandle> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Subscribe {
                topic: topic.to_string(),
                reply,
            })
            .await
            .map_err(|_| NetError::SessionClosed)?;
        response.await.map_err(|_| NetError::SessionClosed)?
    }

    /// Release a subscription handle.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.cmd_tx
            .send(SessionCommand::Unsubscribe(handle))
            .await
            .map_err(|_| NetError::SessionClosed)
    }

    /// Fire-and-forget publish.
    pub async fn send(&self, destination: &str, payload: Vec<u8>) -> Result<()> {
        self.cmd_tx
            .send(SessionCommand::Send {
                destination: destination.to_string(),
                payload,
            })
            .await
            .map_err(|_| NetError::SessionClosed)
    }

    /// Tear the session down. Safe to call on an already-ended session.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }
}

/// Connect the link and spawn the session event loop.
///
/// Returns the command handle and the ordered event receiver. The
/// `Connected` event is emitted before any frame; `Disconnected` is always
/// the last event.
pub fn spawn_session<L: PushLink>(
    mut link: L,
    config: SessionConfig,
) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCommand>(config.command_capacity);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(config.event_capacity);
    let connected = Arc::new(AtomicBool::new(false));

    let handle = SessionHandle {
        cmd_tx,
        connected: connected.clone(),
    };

    tokio::spawn(async move {
        if let Err(e) = link.connect().await {
            warn!(error = %e, "Push channel connect failed");
            let _ = event_tx
                .send(SessionEvent::Disconnected {
                    reason: e.to_string(),
                })
                .await;
            return;
        }

        connected.store(true, Ordering::SeqCst);
        info!("Push channel connected");
        if event_tx.send(SessionEvent::Connected).await.is_err() {
            link.disconnect().await;
            return;
        }

        // handle id -> topic, for the handles this session has issued
        let mut subscriptions: HashMap<u64, String> = HashMap::new();
        let mut next_handle: u64 = 1;

        let reason = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Subscribe { topic, reply }) => {
                            let result = match link.subscribe(&topic).await {
                                Ok(()) => {
                                    let handle = SubscriptionHandle(next_handle);
                                    next_handle += 1;
                                    subscriptions.insert(handle.0, topic.clone());
                                    debug!(topic = %topic, handle = handle.0, "Subscribed");
                                    Ok(handle)
                                }
                                Err(e) => {
                                    error!(topic = %topic, error = %e, "Subscribe failed");
                                    Err(NetError::SubscribeFailed { topic })
                                }
                            };
                            let _ = reply.send(result);
                        }
                        Some(SessionCommand::Unsubscribe(handle)) => {
                            match subscriptions.remove(&handle.0) {
                                Some(topic) => {
                                    if let Err(e) = link.unsubscribe(&topic).await {
                                        error!(topic = %topic, error = %e, "Unsubscribe failed");
                                    } else {
                                        debug!(topic = %topic, handle = handle.0, "Unsubscribed");
                                    }
                                }
                                None => {
                                    debug!(handle = handle.0, "Handle already released");
                                }
                            }
                        }
                        Some(SessionCommand::Send { destination, payload }) => {
                            if let Err(e) = link.send(&destination, payload).await {
                                error!(destination = %destination, error = %e, "Send failed");
                            }
                        }
                        Some(SessionCommand::Shutdown) => {
                            info!("Session shutdown requested");
                            break "shutdown".to_string();
                        }
                        None => {
                            // All handles dropped.
                            break "all session handles dropped".to_string();
                        }
                    }
                }

                frame = link.recv() => {
                    match frame {
                        Some(frame) => {
                            debug!(topic = %frame.topic, len = frame.payload.len(), "Frame received");
                            if event_tx
                                .send(SessionEvent::Frame {
                                    topic: frame.topic,
                                    payload: frame.payload,
                                })
                                .await
                                .is_err()
                            {
                                break "event receiver dropped".to_string();
                            }
                        }
                        None => break "connection closed".to_string(),
                    }
                }
            }
        };

        connected.store(false, Ordering::SeqCst);
        subscriptions.clear();
        link.disconnect().await;
        info!(reason = %reason, "Push channel disconnected");
        let _ = event_tx.send(SessionEvent::Disconnected { reason }).await;
    });

    (handle, event_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;

    async fn connected_session(
        broker: &MemoryBroker,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (handle, mut events) = spawn_session(broker.link(), SessionConfig::default());
        assert_eq!(events.recv().await, Some(SessionEvent::Connected));
        (handle, events)
    }

    #[tokio::test]
    async fn test_subscribe_receives_published_frames() {
        let broker = MemoryBroker::new();
        let (handle, mut events) = connected_session(&broker).await;

        handle.subscribe("/topic/group.1").await.unwrap();
        broker.publish("/topic/group.1", b"one".to_vec());
        broker.publish("/topic/group.1", b"two".to_vec());

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Frame {
                topic: "/topic/group.1".to_string(),
                payload: b"one".to_vec(),
            })
        );
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Frame {
                topic: "/topic/group.1".to_string(),
                payload: b"two".to_vec(),
            })
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let broker = MemoryBroker::new();
        let (handle, mut events) = connected_session(&broker).await;

        let sub = handle.subscribe("/topic/group.1").await.unwrap();
        handle.unsubscribe(sub).await.unwrap();

        // Give the session a chance to process the unsubscribe first.
        handle.subscribe("/queue/messages-probe").await.unwrap();
        broker.publish("/topic/group.1", b"lost".to_vec());
        broker.publish("/queue/messages-probe", b"kept".to_vec());

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Frame {
                topic: "/queue/messages-probe".to_string(),
                payload: b"kept".to_vec(),
            })
        );
    }

    #[tokio::test]
    async fn test_double_release_is_noop() {
        let broker = MemoryBroker::new();
        let (handle, _events) = connected_session(&broker).await;

        let sub = handle.subscribe("/topic/group.1").await.unwrap();
        handle.unsubscribe(sub).await.unwrap();
        // Second release of the same handle must not error or panic.
        handle.unsubscribe(sub).await.unwrap();
    }

    #[tokio::test]
    async fn test_broker_shutdown_emits_disconnected() {
        let broker = MemoryBroker::new();
        let (handle, mut events) = connected_session(&broker).await;

        broker.shutdown();

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Disconnected { .. })
        ));
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_send_reaches_subscribers() {
        let broker = MemoryBroker::new();
        let (sender, _sender_events) = connected_session(&broker).await;
        let (receiver, mut receiver_events) = connected_session(&broker).await;

        receiver.subscribe("/queue/messages-bob").await.unwrap();
        sender
            .send("/queue/messages-bob", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(
            receiver_events.recv().await,
            Some(SessionEvent::Frame {
                topic: "/queue/messages-bob".to_string(),
                payload: b"hello".to_vec(),
            })
        );
    }
}
