//! In-process push broker.
//!
//! Fans published payloads out to every link subscribed to the topic, in
//! publish order. This is the [`PushLink`] implementation used by the
//! engine's tests and simulations; it also stands in for the server side
//! of the channel, so a test can push frames with [`MemoryBroker::publish`]
//! as if they came from the wire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{NetError, Result};
use crate::link::{Frame, PushLink};

#[derive(Default)]
struct BrokerInner {
    next_client: u64,
    /// Connected clients and their inbound frame queues.
    clients: HashMap<u64, mpsc::UnboundedSender<Frame>>,
    /// topic -> subscribed client ids, in subscription order.
    subscriptions: HashMap<String, Vec<u64>>,
}

/// Shared in-process broker. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unconnected link to this broker.
    pub fn link(&self) -> MemoryLink {
        MemoryLink {
            broker: self.clone(),
            client_id: None,
            frames: None,
        }
    }

    /// Publish a payload to every subscriber of `topic`, returning how
    /// many links it reached. Also used by tests to simulate server-side
    /// pushes.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> usize {
        let inner = self.inner.lock().expect("broker lock");
        let Some(subscribers) = inner.subscriptions.get(topic) else {
            return 0;
        };

        let mut reached = 0;
        for client_id in subscribers {
            if let Some(tx) = inner.clients.get(client_id) {
                if tx
                    .send(Frame {
                        topic: topic.to_string(),
                        payload: payload.clone(),
                    })
                    .is_ok()
                {
                    reached += 1;
                }
            }
        }
        reached
    }

    /// Drop every connected client, as if the server went away. Each
    /// link's `recv` yields `None` once its queue drains.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("broker lock");
        inner.clients.clear();
        inner.subscriptions.clear();
    }

    /// Number of live subscriptions for a topic. Test observability.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let inner = self.inner.lock().expect("broker lock");
        inner
            .subscriptions
            .get(topic)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    fn register(&self) -> (u64, mpsc::UnboundedReceiver<Frame>) {
        let mut inner = self.inner.lock().expect("broker lock");
        let id = inner.next_client;
        inner.next_client += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.clients.insert(id, tx);
        (id, rx)
    }

    fn deregister(&self, client_id: u64) {
        let mut inner = self.inner.lock().expect("broker lock");
        inner.clients.remove(&client_id);
        for subscribers in inner.subscriptions.values_mut() {
            subscribers.retain(|id| *id != client_id);
        }
    }

    fn subscribe(&self, client_id: u64, topic: &str) {
        let mut inner = self.inner.lock().expect("broker lock");
        let subscribers = inner.subscriptions.entry(topic.to_string()).or_default();
        if !subscribers.contains(&client_id) {
            subscribers.push(client_id);
        }
    }

    fn unsubscribe(&self, client_id: u64, topic: &str) {
        let mut inner = self.inner.lock().expect("broker lock");
        if let Some(subscribers) = inner.subscriptions.get_mut(topic) {
            subscribers.retain(|id| *id != client_id);
        }
    }
}

/// A [`PushLink`] backed by a [`MemoryBroker`].
pub struct MemoryLink {
    broker: MemoryBroker,
    client_id: Option<u64>,
    frames: Option<mpsc::UnboundedReceiver<Frame>>,
}

impl PushLink for MemoryLink {
    async fn connect(&mut self) -> Result<()> {
        if self.client_id.is_some() {
            return Ok(());
        }
        let (id, rx) = self.broker.register();
        self.client_id = Some(id);
        self.frames = Some(rx);
        debug!(client = id, "Memory link connected");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(id) = self.client_id.take() {
            self.broker.deregister(id);
            self.frames = None;
            debug!(client = id, "Memory link disconnected");
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let id = self.client_id.ok_or(NetError::NotConnected)?;
        self.broker.subscribe(id, topic);
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        let id = self.client_id.ok_or(NetError::NotConnected)?;
        self.broker.unsubscribe(id, topic);
        Ok(())
    }

    async fn send(&mut self, destination: &str, payload: Vec<u8>) -> Result<()> {
        if self.client_id.is_none() {
            return Err(NetError::NotConnected);
        }
        self.broker.publish(destination, payload);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Frame> {
        match self.frames.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}
