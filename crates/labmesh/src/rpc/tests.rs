// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply tests over the in-process transport.

use super::*;
use crate::callback::{CallbackExecutorManager, ErrorCallback, ReplyCallback, RequestCallback};
use crate::codec::{Header, JsonCodec, Payload};
use crate::config::ExecutorConfig;
use crate::context::ClientContext;
use crate::dispatch::{Registration, RootDispatcher};
use crate::error::{ErrorCode, ErrorPayload, LabmeshError};
use crate::topic::{AddressBuilder, Destination, Identity, Topic, TransmissionKind};
use crate::transport::{MemoryBroker, Transport};
use crossbeam::channel::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

struct Peer {
    context: ClientContext,
    handlers: RequestReplyHandlers,
    requester: Requester,
}

fn peer(broker: &Arc<MemoryBroker>, group: &str, client: &str) -> Peer {
    let transport = broker.endpoint(client).expect("endpoint");
    transport.connect().expect("connect");
    let dispatcher = RootDispatcher::new(Arc::new(transport));
    let executors = CallbackExecutorManager::new(&ExecutorConfig::elastic(8, Duration::from_secs(1)))
        .expect("executors");
    let context = ClientContext::new(
        Identity::new(group, client).expect("identity"),
        AddressBuilder::new(["lab"], "test").expect("addresses"),
        dispatcher,
        Arc::new(JsonCodec::default()),
        Arc::new(executors),
    );
    Peer {
        handlers: RequestReplyHandlers::new(context.clone()).expect("handlers"),
        requester: Requester::new(context.clone()),
        context,
    }
}

fn subject(text: &str) -> Topic {
    Topic::parse(text).expect("subject")
}

fn error_channel() -> (ErrorCallback, Receiver<Vec<ErrorPayload>>) {
    let (tx, rx) = channel::unbounded();
    let callback: ErrorCallback = Arc::new(move |_topic: &Topic, errors: &[ErrorPayload]| {
        let _ = tx.send(errors.to_vec());
    });
    (callback, rx)
}

fn reply_channel() -> (ReplyCallback, Receiver<Vec<Payload>>) {
    let (tx, rx) = channel::unbounded();
    let callback: ReplyCallback = Arc::new(move |_header: &Header, payloads: &[Payload]| -> anyhow::Result<()> {
        let _ = tx.send(payloads.to_vec());
        Ok(())
    });
    (callback, rx)
}

#[test]
fn test_handler_without_result_replies_status_ok() {
    let broker = MemoryBroker::new();
    let server = peer(&broker, "plant", "motor");
    let client = peer(&broker, "ctrl", "pid");

    let silent: RequestCallback = Arc::new(|_: &Header, _: &[Payload]| -> anyhow::Result<Vec<Payload>> { Ok(Vec::new()) });
    server
        .handlers
        .register_request_handler(&subject("reset"), silent, None)
        .expect("register");

    let (on_reply, replies) = reply_channel();
    client
        .requester
        .send_request(
            &Destination::client("plant", "motor").expect("destination"),
            &subject("reset"),
            vec![Payload::string("now")],
            ReplyCount::ONE,
            WAIT,
            on_reply,
            None,
        )
        .expect("send");

    let reply = replies.recv_timeout(WAIT).expect("reply");
    assert_eq!(reply.len(), 1);
    assert!(reply[0].is_status_ok());
}

#[test]
fn test_unregistered_request_handler_can_be_replaced() {
    let broker = MemoryBroker::new();
    let server = peer(&broker, "plant", "motor");
    let first: RequestCallback = Arc::new(|_: &Header, _: &[Payload]| -> anyhow::Result<Vec<Payload>> { Ok(Vec::new()) });
    let second: RequestCallback = Arc::new(|_: &Header, _: &[Payload]| -> anyhow::Result<Vec<Payload>> { Ok(Vec::new()) });

    server
        .handlers
        .register_request_handler(&subject("cfg"), Arc::clone(&first), None)
        .expect("first");
    assert!(matches!(
        server
            .handlers
            .register_request_handler(&subject("cfg"), Arc::clone(&second), None),
        Err(LabmeshError::DuplicateHandler(_))
    ));
    assert!(server.handlers.unregister_request_handler(&subject("cfg")));
    assert!(!server.handlers.unregister_request_handler(&subject("cfg")));
    server
        .handlers
        .register_request_handler(&subject("cfg"), second, None)
        .expect("second");
}

#[test]
fn test_reply_handler_registration_is_idempotent() {
    let broker = MemoryBroker::new();
    let client = peer(&broker, "ctrl", "pid");
    let (on_reply, _replies) = reply_channel();
    let topic = subject("ping/abc123");

    assert_eq!(
        client
            .handlers
            .register_reply_handler(&topic, Arc::clone(&on_reply), None)
            .expect("register"),
        Registration::Added
    );
    assert_eq!(
        client
            .handlers
            .register_reply_handler(&topic, Arc::clone(&on_reply), None)
            .expect("register"),
        Registration::AlreadyPresent
    );
    let (other, _) = reply_channel();
    assert_eq!(
        client
            .handlers
            .register_reply_handler(&topic, Arc::clone(&other), None)
            .expect("register"),
        Registration::Added
    );

    assert!(client.handlers.unregister_reply_handler(&topic, &on_reply));
    assert!(!client.handlers.unregister_reply_handler(&topic, &on_reply));
    assert!(client.handlers.unregister_reply_handler(&topic, &other));
}

#[test]
fn test_empty_reply_reports_empty_payload() {
    let broker = MemoryBroker::new();
    let client = peer(&broker, "ctrl", "pid");
    let server = peer(&broker, "plant", "motor");

    let (on_reply, replies) = reply_channel();
    let (on_error, errors) = error_channel();
    client
        .handlers
        .register_reply_handler(&subject("ping/c0ffee"), on_reply, Some(on_error))
        .expect("register");

    let header = server
        .context
        .header(TransmissionKind::Rep, &subject("ping"))
        .with_correlation_id("c0ffee");
    let topic = server
        .context
        .addresses()
        .reply(client.context.identity(), &subject("ping"), "c0ffee");
    server.context.publish(&topic, &header, &[]).expect("publish");

    let reported = errors.recv_timeout(WAIT).expect("errors");
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].code, ErrorCode::EmptyPayload);
    assert!(replies.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_request_without_correlation_id_is_rejected() {
    let broker = MemoryBroker::new();
    let server = peer(&broker, "plant", "motor");
    let client = peer(&broker, "ctrl", "pid");

    let (handled_tx, handled) = channel::unbounded();
    let callback: RequestCallback = Arc::new(move |_: &Header, _: &[Payload]| -> anyhow::Result<Vec<Payload>> {
        let _ = handled_tx.send(());
        Ok(vec![Payload::string("pong")])
    });
    let (on_error, errors) = error_channel();
    server
        .handlers
        .register_request_handler(&subject("ping"), callback, Some(on_error))
        .expect("register");

    let destination = Destination::from(server.context.identity());
    let topic = client.context.addresses().request(&destination, &subject("ping"));
    let header = client.context.header(TransmissionKind::Req, &subject("ping"));
    client
        .context
        .publish(&topic, &header, &[Payload::string("ping")])
        .expect("publish");

    handled.recv_timeout(WAIT).expect("handler still runs");
    let reported = errors.recv_timeout(WAIT).expect("errors");
    let codes: Vec<_> = reported.iter().map(|e| e.code).collect();
    assert_eq!(codes, vec![ErrorCode::Validation, ErrorCode::Processing]);
}

#[test]
fn test_request_to_unknown_subject_times_out() {
    let broker = MemoryBroker::new();
    let client = peer(&broker, "ctrl", "pid");
    let (on_reply, _replies) = reply_channel();
    let (on_error, errors) = error_channel();

    let id = client
        .requester
        .send_request(
            &Destination::all(),
            &subject("nobody/home"),
            vec![],
            ReplyCount::exactly(3).expect("count"),
            Duration::from_millis(50),
            on_reply,
            Some(on_error),
        )
        .expect("send");

    let reported = errors.recv_timeout(WAIT).expect("timeout");
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].code, ErrorCode::Timeout);
    assert!(reported[0].message.contains(id.as_str()));
    assert!(reported[0].message.contains("received 0 of 3"));

    let stats = client.requester.stats();
    assert_eq!(stats.requests_timed_out, 1);
    assert_eq!(stats.reply_nodes_removed, 1);
    let reply_base = client.context.addresses().base(TransmissionKind::Rep);
    assert!(!client.context.dispatcher().has_dispatcher(&reply_base));
}
