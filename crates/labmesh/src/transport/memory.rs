// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process broker and transport.
//!
//! Every [`MemoryTransport`] endpoint owns one delivery thread, so inbound
//! traffic for a client is serialized the same way a network transport's
//! receive loop would serialize it.

use super::{MessageSink, Transport, TransportError, TransportResult};
use crate::topic::pattern_matches;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

enum Delivery {
    Message {
        topic: Vec<String>,
        payload: Arc<[u8]>,
    },
    Connection(bool),
    Stop,
}

struct Endpoint {
    id: u64,
    name: String,
    connected: AtomicBool,
    patterns: Mutex<HashSet<Vec<String>>>,
    tx: Sender<Delivery>,
}

impl Endpoint {
    fn matches(&self, topic: &[String]) -> bool {
        self.patterns
            .lock()
            .iter()
            .any(|pattern| pattern_matches(pattern, topic))
    }
}

/// Shared in-process message broker.
pub struct MemoryBroker {
    endpoints: RwLock<Vec<Arc<Endpoint>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        })
    }

    /// Create a new, disconnected endpoint attached to this broker.
    pub fn endpoint(self: &Arc<Self>, name: &str) -> TransportResult<MemoryTransport> {
        let (tx, rx) = channel::unbounded();
        let sink: Arc<Mutex<Option<Weak<dyn MessageSink>>>> = Arc::new(Mutex::new(None));

        let delivery = {
            let sink = Arc::clone(&sink);
            thread::Builder::new()
                .name(format!("labmesh-mem-{}", name))
                .spawn(move || delivery_loop(rx, sink))
                .map_err(|e| TransportError::Rejected(format!("spawn delivery thread: {}", e)))?
        };

        let endpoint = Arc::new(Endpoint {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            connected: AtomicBool::new(false),
            patterns: Mutex::new(HashSet::new()),
            tx,
        });
        self.endpoints.write().push(Arc::clone(&endpoint));
        log::debug!("[transport] memory endpoint '{}' attached", name);

        Ok(MemoryTransport {
            broker: Arc::clone(self),
            endpoint,
            sink,
            delivery: Mutex::new(Some(delivery)),
        })
    }

    /// Number of attached endpoints.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.read().len()
    }

    /// (messages published, per-endpoint deliveries queued)
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.published.load(Ordering::Relaxed),
            self.delivered.load(Ordering::Relaxed),
        )
    }

    fn route(&self, topic: &[String], payload: &[u8]) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let payload: Arc<[u8]> = Arc::from(payload);
        let endpoints = self.endpoints.read();
        let mut count = 0;
        for endpoint in endpoints.iter() {
            if !endpoint.connected.load(Ordering::Acquire) || !endpoint.matches(topic) {
                continue;
            }
            let delivery = Delivery::Message {
                topic: topic.to_vec(),
                payload: Arc::clone(&payload),
            };
            if endpoint.tx.send(delivery).is_ok() {
                count += 1;
            }
        }
        self.delivered.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    fn detach(&self, id: u64) {
        self.endpoints.write().retain(|endpoint| endpoint.id != id);
    }
}

fn delivery_loop(rx: Receiver<Delivery>, sink: Arc<Mutex<Option<Weak<dyn MessageSink>>>>) {
    while let Ok(delivery) = rx.recv() {
        let current = sink.lock().as_ref().and_then(Weak::upgrade);
        match delivery {
            Delivery::Stop => break,
            Delivery::Message { topic, payload } => {
                if let Some(sink) = current {
                    sink.on_message(&topic, &payload);
                }
            }
            Delivery::Connection(connected) => {
                if let Some(sink) = current {
                    sink.on_connection_state(connected);
                }
            }
        }
    }
}

/// One client's connection to a [`MemoryBroker`].
///
/// Subscriptions are kept across disconnects; messages are only routed to
/// connected endpoints.
pub struct MemoryTransport {
    broker: Arc<MemoryBroker>,
    endpoint: Arc<Endpoint>,
    sink: Arc<Mutex<Option<Weak<dyn MessageSink>>>>,
    delivery: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryTransport {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    /// Currently active subscription patterns.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Vec<String>> {
        let mut patterns: Vec<_> = self.endpoint.patterns.lock().iter().cloned().collect();
        patterns.sort();
        patterns
    }
}

impl Transport for MemoryTransport {
    fn connect(&self) -> TransportResult<()> {
        if !self.endpoint.connected.swap(true, Ordering::AcqRel) {
            log::debug!("[transport] '{}' connected", self.endpoint.name);
            self.endpoint
                .tx
                .send(Delivery::Connection(true))
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    fn disconnect(&self) -> TransportResult<()> {
        if self.endpoint.connected.swap(false, Ordering::AcqRel) {
            log::debug!("[transport] '{}' disconnected", self.endpoint.name);
            self.endpoint
                .tx
                .send(Delivery::Connection(false))
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.endpoint.connected.load(Ordering::Acquire)
    }

    fn subscribe(&self, pattern: &[String]) -> TransportResult<()> {
        if pattern.is_empty() {
            return Err(TransportError::Rejected("empty pattern".into()));
        }
        self.endpoint.patterns.lock().insert(pattern.to_vec());
        Ok(())
    }

    fn unsubscribe(&self, pattern: &[String]) -> TransportResult<()> {
        self.endpoint.patterns.lock().remove(pattern);
        Ok(())
    }

    fn publish(&self, topic: &[String], payload: &[u8]) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let receivers = self.broker.route(topic, payload);
        log::trace!(
            "[transport] '{}' published {} bytes on {} ({} receivers)",
            self.endpoint.name,
            payload.len(),
            topic.join("/"),
            receivers
        );
        Ok(())
    }

    fn set_sink(&self, sink: Weak<dyn MessageSink>) {
        *self.sink.lock() = Some(sink);
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.endpoint.connected.store(false, Ordering::Release);
        self.broker.detach(self.endpoint.id);
        let _ = self.endpoint.tx.send(Delivery::Stop);
        if let Some(handle) = self.delivery.lock().take() {
            // Dropped from inside a delivery callback: the loop exits on Stop.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct ChannelSink(Sender<(String, Vec<u8>)>, Sender<bool>);

    impl MessageSink for ChannelSink {
        fn on_message(&self, topic: &[String], payload: &[u8]) {
            let _ = self.0.send((topic.join("/"), payload.to_vec()));
        }

        fn on_connection_state(&self, connected: bool) {
            let _ = self.1.send(connected);
        }
    }

    fn segs(text: &str) -> Vec<String> {
        text.split('/').map(str::to_string).collect()
    }

    #[test]
    fn test_wildcard_routing_between_endpoints() {
        let broker = MemoryBroker::new();
        let publisher = broker.endpoint("pub").expect("endpoint");
        let subscriber = broker.endpoint("sub").expect("endpoint");

        let (msg_tx, msg_rx) = channel::unbounded();
        let (state_tx, state_rx) = channel::unbounded();
        let sink: Arc<dyn MessageSink> = Arc::new(ChannelSink(msg_tx, state_tx));
        subscriber.set_sink(Arc::downgrade(&sink));

        subscriber.subscribe(&segs("lab/+/temp/#")).expect("subscribe");
        subscriber.connect().expect("connect");
        publisher.connect().expect("connect");
        assert_eq!(state_rx.recv_timeout(Duration::from_secs(1)), Ok(true));

        publisher.publish(&segs("lab/a/temp/x"), b"1").expect("publish");
        publisher.publish(&segs("lab/a/pressure"), b"2").expect("publish");
        publisher.publish(&segs("lab/b/temp"), b"3").expect("publish");

        let first = msg_rx.recv_timeout(Duration::from_secs(1)).expect("first");
        let second = msg_rx.recv_timeout(Duration::from_secs(1)).expect("second");
        assert_eq!(first, ("lab/a/temp/x".to_string(), b"1".to_vec()));
        assert_eq!(second, ("lab/b/temp".to_string(), b"3".to_vec()));
        assert!(msg_rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_publish_requires_connection() {
        let broker = MemoryBroker::new();
        let transport = broker.endpoint("lonely").expect("endpoint");
        assert_eq!(
            transport.publish(&segs("a/b"), b"x"),
            Err(TransportError::NotConnected)
        );
        transport.connect().expect("connect");
        assert!(transport.publish(&segs("a/b"), b"x").is_ok());
    }

    #[test]
    fn test_drop_detaches_endpoint() {
        let broker = MemoryBroker::new();
        let transport = broker.endpoint("tmp").expect("endpoint");
        transport.subscribe(&segs("a/#")).expect("subscribe");
        assert_eq!(transport.subscriptions(), vec![segs("a/#")]);
        assert_eq!(broker.endpoint_count(), 1);
        drop(transport);
        assert_eq!(broker.endpoint_count(), 0);
    }
}
