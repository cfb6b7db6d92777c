// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # labmesh - addressed pub/sub messaging and RPC for co-simulation clients
//!
//! Every participant of a lab platform is a [`Client`] identified by a
//! `(group, client)` pair. Clients exchange one-way notifications and
//! request/reply calls over a hierarchical publish/subscribe transport.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use labmesh::{Client, ClientConfig, Header, MemoryBroker, Payload, RequestCallback, Topic};
//! use std::sync::Arc;
//!
//! fn main() -> labmesh::Result<()> {
//!     let broker = MemoryBroker::new();
//!     let motor = Client::builder(ClientConfig::new("plant", "motor"))
//!         .transport(Arc::new(broker.endpoint("motor")?))
//!         .build()?;
//!     motor.connect()?;
//!
//!     let pong: RequestCallback = Arc::new(|_: &Header, _: &[Payload]| -> anyhow::Result<Vec<Payload>> {
//!         Ok(vec![Payload::string("pong")])
//!     });
//!     motor.register_request_handler(&Topic::parse("ping")?, pong, None)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                              Client                                 |
//! |   MessageHandlers | RequestReplyHandlers | Requester                |
//! +---------------------------------------------------------------------+
//! |                        Callback executors                           |
//! |   CallbackHandler -> CallbackJob -> CallbackExecutorManager pool    |
//! +---------------------------------------------------------------------+
//! |                          Dispatch tree                              |
//! |   RootDispatcher -> DispatchNode (plain / rpc request / rpc reply)  |
//! +---------------------------------------------------------------------+
//! |                            Transport                                |
//! |   Transport + MessageSink contract | in-process MemoryBroker        |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Topic Layout
//!
//! `<prefix...>/<application>/<kind>/<group>/<client>/<subject...>[/<correlation id>]`
//! where `kind` is `msg`, `req` or `rep`. See [`topic::AddressBuilder`].

/// Callback executor pool and per-delivery jobs.
pub mod callback;
/// Client facade and builder.
pub mod client;
/// Packet headers, payloads and the wire codec.
pub mod codec;
/// TOML-backed client and executor configuration.
pub mod config;
/// Collaborators shared by the messaging and RPC layers.
pub mod context;
/// Hierarchical topic dispatch tree.
pub mod dispatch;
/// API errors and wire-visible error payloads.
pub mod error;
/// One-way notifications.
pub mod messaging;
/// Request/reply with correlation ids.
pub mod rpc;
/// Topics, identities and address construction.
pub mod topic;
/// Transport contract and the in-process broker.
pub mod transport;

pub use callback::{
    CallbackExecutorManager, ErrorCallback, MessageCallback, ReplyCallback, RequestCallback,
    ShutdownReport,
};
pub use client::{Client, ClientBuilder};
pub use codec::{Header, JsonCodec, PacketCodec, Payload, PayloadRegistry};
pub use config::{ClientConfig, ConfigError, ExecutorConfig};
pub use dispatch::{Registration, RootDispatcher, TopicHandler};
pub use error::{ErrorCode, ErrorPayload, LabmeshError, Result};
pub use rpc::{CorrelationId, ReplyCount, RequesterStatsSnapshot};
pub use topic::{AddressBuilder, Destination, Identity, Topic, TransmissionKind};
pub use transport::{MemoryBroker, MemoryTransport, MessageSink, Transport, TransportError};

/// labmesh version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
