// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/subscribe transport contract.
//!
//! The dispatch core only needs a handful of operations from the underlying
//! transport: connection control, pattern (un)subscription, publishing, and a
//! way to hand inbound messages and connection-state changes to a
//! [`MessageSink`]. Inbound delivery is expected to happen on a single (or
//! serialized) delivery thread per transport.

mod memory;

pub use memory::{MemoryBroker, MemoryTransport};

use std::sync::Weak;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport not connected")]
    NotConnected,

    #[error("Transport closed")]
    Closed,

    #[error("Rejected by transport: {0}")]
    Rejected(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Receiver of inbound traffic.
///
/// Implementations must return quickly: `on_message` runs on the transport's
/// delivery thread.
pub trait MessageSink: Send + Sync {
    /// Called for every inbound message matching one of the subscriptions.
    fn on_message(&self, topic: &[String], payload: &[u8]);

    /// Called when the connection is established or lost.
    fn on_connection_state(&self, _connected: bool) {}
}

/// Publish/subscribe transport.
pub trait Transport: Send + Sync {
    fn connect(&self) -> TransportResult<()>;

    fn disconnect(&self) -> TransportResult<()>;

    fn is_connected(&self) -> bool;

    /// Subscribe to a pattern; the last segment may be a transport wildcard.
    fn subscribe(&self, pattern: &[String]) -> TransportResult<()>;

    fn unsubscribe(&self, pattern: &[String]) -> TransportResult<()>;

    fn publish(&self, topic: &[String], payload: &[u8]) -> TransportResult<()>;

    /// Install the inbound sink. The transport holds it weakly so the sink's
    /// owner controls its lifetime.
    fn set_sink(&self, sink: Weak<dyn MessageSink>);
}
