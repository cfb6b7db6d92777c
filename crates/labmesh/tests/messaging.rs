// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notifications, client construction and configuration.

mod common;

use common::{client, error_channel, reply_channel, subject, tap, wait_until, WAIT};
use labmesh::{
    Client, ClientConfig, ErrorCode, ErrorPayload, Header, LabmeshError, MemoryBroker,
    MessageCallback, Payload, Registration,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_notification_reaches_every_registered_callback() {
    let broker = MemoryBroker::new();
    let sensor = client(&broker, "sensors", "thermo");
    let first_listener = client(&broker, "ctrl", "pid");
    let second_listener = client(&broker, "ui", "panel");

    let (first, first_rx) = reply_channel();
    let (second, second_rx) = reply_channel();
    let (third, third_rx) = reply_channel();
    for (listener, callback) in [
        (&first_listener, &first),
        (&first_listener, &second),
        (&second_listener, &third),
    ] {
        assert_eq!(
            listener
                .register_message_handler(
                    sensor.identity(),
                    &subject("temperature"),
                    Arc::clone(callback),
                    None
                )
                .expect("register"),
            Registration::Added
        );
    }

    sensor
        .publish(&subject("temperature"), &[Payload::string("21.5")])
        .expect("publish");

    for rx in [&first_rx, &second_rx, &third_rx] {
        let (header, payloads) = rx.recv_timeout(WAIT).expect("notification");
        assert_eq!(header.sender, *sensor.identity());
        assert_eq!(header.subject, vec!["temperature".to_string()]);
        assert!(header.correlation_id.is_none());
        assert_eq!(payloads, vec![Payload::string("21.5")]);
    }
}

#[test]
fn test_notification_topic_carries_publisher_identity() {
    let broker = MemoryBroker::new();
    let observer = tap(&broker);
    let sensor = client(&broker, "sensors", "thermo");

    sensor
        .publish(&subject("temperature/inlet"), &[Payload::string("18")])
        .expect("publish");
    let (topic, _) = observer
        .next_with_prefix("labmesh/default/msg/")
        .expect("notification on the wire");
    assert_eq!(topic, "labmesh/default/msg/sensors/thermo/temperature/inlet");
}

#[test]
fn test_duplicate_and_removed_message_callbacks() {
    let broker = MemoryBroker::new();
    let sensor = client(&broker, "sensors", "thermo");
    let listener = client(&broker, "ctrl", "pid");

    let (kept, kept_rx) = reply_channel();
    let (removed, removed_rx) = reply_channel();
    let topic = subject("temperature");
    listener
        .register_message_handler(sensor.identity(), &topic, Arc::clone(&kept), None)
        .expect("register");
    assert_eq!(
        listener
            .register_message_handler(sensor.identity(), &topic, Arc::clone(&kept), None)
            .expect("register again"),
        Registration::AlreadyPresent
    );
    listener
        .register_message_handler(sensor.identity(), &topic, Arc::clone(&removed), None)
        .expect("register second");

    assert!(listener.unregister_message_handler(sensor.identity(), &topic, &removed));
    assert!(!listener.unregister_message_handler(sensor.identity(), &topic, &removed));

    sensor
        .publish(&topic, &[Payload::string("22")])
        .expect("publish");
    kept_rx.recv_timeout(WAIT).expect("kept callback fires once");
    assert!(kept_rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(removed_rx.try_recv().is_err());
}

#[test]
fn test_other_sources_are_not_delivered() {
    let broker = MemoryBroker::new();
    let thermo = client(&broker, "sensors", "thermo");
    let hygro = client(&broker, "sensors", "hygro");
    let listener = client(&broker, "ctrl", "pid");

    let (callback, rx) = reply_channel();
    listener
        .register_message_handler(thermo.identity(), &subject("reading"), callback, None)
        .expect("register");

    hygro
        .publish(&subject("reading"), &[Payload::string("55%")])
        .expect("publish");
    thermo
        .publish(&subject("reading"), &[Payload::string("20")])
        .expect("publish");

    let (header, payloads) = rx.recv_timeout(WAIT).expect("thermo reading");
    assert_eq!(header.sender, *thermo.identity());
    assert_eq!(payloads, vec![Payload::string("20")]);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_error_payloads_are_split_from_the_body() {
    let broker = MemoryBroker::new();
    let sensor = client(&broker, "sensors", "thermo");
    let listener = client(&broker, "ctrl", "pid");

    let (callback, rx) = reply_channel();
    let (on_error, errors) = error_channel();
    listener
        .register_message_handler(sensor.identity(), &subject("reading"), callback, Some(on_error))
        .expect("register");

    let fault = ErrorPayload::new(
        ErrorCode::application(-150).expect("application code"),
        "sensor disconnected",
    );
    sensor
        .publish(
            &subject("reading"),
            &[Payload::string("stale"), Payload::error(&fault)],
        )
        .expect("publish");

    let (_, payloads) = rx.recv_timeout(WAIT).expect("body");
    assert_eq!(payloads, vec![Payload::string("stale")]);
    let reported = errors.recv_timeout(WAIT).expect("errors");
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].code, ErrorCode::Application(-150));
    assert_eq!(reported[0].message, "sensor disconnected");
}

#[test]
fn test_failing_callback_is_reported_and_isolated() {
    let broker = MemoryBroker::new();
    let sensor = client(&broker, "sensors", "thermo");
    let listener = client(&broker, "ctrl", "pid");

    let failing: MessageCallback =
        Arc::new(|_: &Header, _: &[Payload]| -> anyhow::Result<()> { anyhow::bail!("bad reading") });
    let panicking: MessageCallback =
        Arc::new(|_: &Header, _: &[Payload]| -> anyhow::Result<()> { panic!("sensor exploded") });
    let (healthy, healthy_rx) = reply_channel();
    let (on_error, errors) = error_channel();

    let topic = subject("reading");
    listener
        .register_message_handler(sensor.identity(), &topic, failing, Some(Arc::clone(&on_error)))
        .expect("register failing");
    listener
        .register_message_handler(sensor.identity(), &topic, panicking, Some(on_error))
        .expect("register panicking");
    listener
        .register_message_handler(sensor.identity(), &topic, healthy, None)
        .expect("register healthy");

    sensor
        .publish(&topic, &[Payload::string("x")])
        .expect("publish");

    healthy_rx.recv_timeout(WAIT).expect("healthy callback still runs");
    let mut messages: Vec<String> = (0..2)
        .map(|_| {
            let reported = errors.recv_timeout(WAIT).expect("errors");
            assert_eq!(reported.len(), 1);
            assert_eq!(reported[0].code, ErrorCode::Processing);
            reported[0].message.clone()
        })
        .collect();
    messages.sort();
    assert!(messages[0].contains("bad reading"));
    assert!(messages[1].contains("sensor exploded"));
}

#[test]
fn test_builder_requires_a_transport() {
    let result = Client::builder(ClientConfig::new("ctrl", "pid")).build();
    assert!(matches!(
        result,
        Err(LabmeshError::MissingDependency("transport"))
    ));
}

#[test]
fn test_builder_rejects_invalid_identity() {
    let broker = MemoryBroker::new();
    let transport = broker.endpoint("bad").expect("endpoint");
    let result = Client::builder(ClientConfig::new("ctrl/room", "pid"))
        .transport(Arc::new(transport))
        .build();
    assert!(matches!(result, Err(LabmeshError::Config(_))));
}

#[test]
fn test_client_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
name = "bench-controller"
prefix = ["lab", "cell1"]
application_id = "cosim"
group_id = "ctrl"
client_id = "pid"
default_timeout_ms = 250

[executor]
pool_size = 4
"#
    )
    .expect("write config");

    let config = ClientConfig::from_file(file.path()).expect("load config");
    let broker = MemoryBroker::new();
    let observer = tap(&broker);
    let transport = broker.endpoint("ctrl.pid").expect("endpoint");
    let client = Client::builder(config)
        .transport(Arc::new(transport))
        .build()
        .expect("build");
    client.connect().expect("connect");

    assert_eq!(client.config().name, "bench-controller");
    assert_eq!(client.config().executor.pool_size, Some(4));
    assert_eq!(client.identity().to_string(), "ctrl/pid");

    client
        .publish(&subject("status"), &[Payload::string("up")])
        .expect("publish");
    let (topic, _) = observer
        .next_with_prefix("lab/cell1/cosim/msg/")
        .expect("notification");
    assert_eq!(topic, "lab/cell1/cosim/msg/ctrl/pid/status");
}

#[test]
fn test_dispatch_stats_count_deliveries() {
    let broker = MemoryBroker::new();
    let sensor = client(&broker, "sensors", "thermo");
    let listener = client(&broker, "ctrl", "pid");

    let (callback, rx) = reply_channel();
    listener
        .register_message_handler(sensor.identity(), &subject("reading"), callback, None)
        .expect("register");
    for value in ["1", "2", "3"] {
        sensor
            .publish(&subject("reading"), &[Payload::string(value)])
            .expect("publish");
    }
    for _ in 0..3 {
        rx.recv_timeout(WAIT).expect("reading");
    }
    assert!(wait_until(|| listener.dispatch_stats().messages_dispatched >= 3));
    assert_eq!(listener.dispatch_stats().handler_panics, 0);
}
