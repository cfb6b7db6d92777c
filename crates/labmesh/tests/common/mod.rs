// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared helpers for the integration tests.

#![allow(dead_code)]

use crossbeam::channel::{self, Receiver};
use labmesh::{
    Client, ClientConfig, ErrorCallback, ErrorPayload, ExecutorConfig, Header, MemoryBroker,
    MessageSink, Payload, ReplyCallback, Topic, Transport,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(3);

/// Connected client on `broker` with an elastic pool.
pub fn client(broker: &Arc<MemoryBroker>, group: &str, client_id: &str) -> Client {
    let config = ClientConfig::new(group, client_id)
        .executor(ExecutorConfig::elastic(8, Duration::from_secs(1)));
    let transport = broker
        .endpoint(&format!("{}.{}", group, client_id))
        .expect("endpoint");
    let client = Client::builder(config)
        .transport(Arc::new(transport))
        .build()
        .expect("build client");
    client.connect().expect("connect");
    client
}

pub fn subject(text: &str) -> Topic {
    Topic::parse(text).expect("subject")
}

pub fn reply_channel() -> (ReplyCallback, Receiver<(Header, Vec<Payload>)>) {
    let (tx, rx) = channel::unbounded();
    let callback: ReplyCallback =
        Arc::new(move |header: &Header, payloads: &[Payload]| -> anyhow::Result<()> {
            let _ = tx.send((header.clone(), payloads.to_vec()));
            Ok(())
        });
    (callback, rx)
}

pub fn error_channel() -> (ErrorCallback, Receiver<Vec<ErrorPayload>>) {
    let (tx, rx) = channel::unbounded();
    let callback: ErrorCallback = Arc::new(move |_topic: &Topic, errors: &[ErrorPayload]| {
        let _ = tx.send(errors.to_vec());
    });
    (callback, rx)
}

/// Poll `condition` until it holds or `WAIT` elapses.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Raw observer of everything crossing the broker.
pub struct Tap {
    _transport: labmesh::MemoryTransport,
    _sink: Arc<dyn MessageSink>,
    pub messages: Receiver<(String, Vec<u8>)>,
}

struct TapSink(channel::Sender<(String, Vec<u8>)>);

impl MessageSink for TapSink {
    fn on_message(&self, topic: &[String], payload: &[u8]) {
        let _ = self.0.send((topic.join("/"), payload.to_vec()));
    }
}

pub fn tap(broker: &Arc<MemoryBroker>) -> Tap {
    let transport = broker.endpoint("tap").expect("endpoint");
    let (tx, messages) = channel::unbounded();
    let sink: Arc<dyn MessageSink> = Arc::new(TapSink(tx));
    transport.set_sink(Arc::downgrade(&sink));
    transport.subscribe(&["#".to_string()]).expect("subscribe");
    transport.connect().expect("connect");
    Tap {
        _transport: transport,
        _sink: sink,
        messages,
    }
}

impl Tap {
    /// Next observed message whose topic starts with `prefix`.
    pub fn next_with_prefix(&self, prefix: &str) -> Option<(String, Vec<u8>)> {
        let deadline = Instant::now() + WAIT;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.messages.recv_timeout(left) {
                Ok((topic, bytes)) if topic.starts_with(prefix) => return Some((topic, bytes)),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    }
}
