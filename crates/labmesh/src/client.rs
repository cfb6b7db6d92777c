// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client facade wiring dispatch, executors, messaging and RPC together.
//!
//! # Example
//!
//! ```no_run
//! use labmesh::{Client, ClientConfig, Destination, Header, MemoryBroker, Payload, ReplyCount, Topic};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> labmesh::Result<()> {
//! let broker = MemoryBroker::new();
//! let client = Client::builder(ClientConfig::new("ctrl", "pid"))
//!     .transport(Arc::new(broker.endpoint("pid")?))
//!     .build()?;
//! client.connect()?;
//!
//! let on_reply: labmesh::ReplyCallback = Arc::new(|header: &Header, payloads: &[Payload]| -> anyhow::Result<()> {
//!     println!("{} answered {:?}", header.sender, payloads);
//!     Ok(())
//! });
//! client.send_request(
//!     &Destination::all(),
//!     &Topic::parse("ping")?,
//!     vec![Payload::string("ping")],
//!     ReplyCount::Unlimited,
//!     Duration::from_millis(500),
//!     on_reply,
//!     None,
//! )?;
//! # Ok(())
//! # }
//! ```

use crate::callback::{
    CallbackExecutorManager, ErrorCallback, MessageCallback, ReplyCallback, RequestCallback,
    ShutdownReport,
};
use crate::codec::{JsonCodec, PacketCodec, Payload};
use crate::config::ClientConfig;
use crate::context::ClientContext;
use crate::dispatch::{DispatchStats, Registration, RootDispatcher};
use crate::error::{LabmeshError, Result};
use crate::messaging::MessageHandlers;
use crate::rpc::{CorrelationId, ReplyCount, RequestReplyHandlers, Requester, RequesterStatsSnapshot};
use crate::topic::{AddressBuilder, Destination, Identity, Topic};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`Client`]. The transport is mandatory; codec and executors
/// default to [`JsonCodec`] and a pool built from the configuration.
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    codec: Option<Arc<dyn PacketCodec>>,
    executors: Option<Arc<CallbackExecutorManager>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn PacketCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Share an existing worker pool instead of creating one.
    #[must_use]
    pub fn executors(mut self, executors: Arc<CallbackExecutorManager>) -> Self {
        self.executors = Some(executors);
        self
    }

    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or(LabmeshError::MissingDependency("transport"))?;
        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(JsonCodec::default()) as Arc<dyn PacketCodec>);
        let executors = match self.executors {
            Some(executors) => executors,
            None => Arc::new(CallbackExecutorManager::new(&self.config.executor)?),
        };

        let dispatcher = RootDispatcher::new(transport);
        let context = ClientContext::new(
            self.config.identity()?,
            self.config.address_builder()?,
            dispatcher,
            codec,
            executors,
        );
        let rpc = RequestReplyHandlers::new(context.clone())?;
        log::info!(
            "[client] '{}' ready as {}",
            self.config.name,
            context.identity()
        );

        Ok(Client {
            messages: MessageHandlers::new(context.clone()),
            requester: Requester::new(context.clone()),
            rpc,
            context,
            config: self.config,
        })
    }
}

/// One participant of the platform.
pub struct Client {
    config: ClientConfig,
    context: ClientContext,
    messages: MessageHandlers,
    rpc: RequestReplyHandlers,
    requester: Requester,
}

impl Client {
    #[must_use]
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            codec: None,
            executors: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        self.context.identity()
    }

    #[must_use]
    pub fn addresses(&self) -> &AddressBuilder {
        self.context.addresses()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<RootDispatcher> {
        self.context.dispatcher()
    }

    #[must_use]
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.context.dispatcher().metrics()
    }

    #[must_use]
    pub fn requester_stats(&self) -> RequesterStatsSnapshot {
        self.requester.stats()
    }

    pub fn connect(&self) -> Result<()> {
        self.context.dispatcher().transport().connect()?;
        log::info!("[client] {} connected", self.identity());
        Ok(())
    }

    pub fn disconnect(&self) -> Result<()> {
        self.context.dispatcher().transport().disconnect()?;
        log::info!("[client] {} disconnected", self.identity());
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.context.dispatcher().transport().is_connected()
    }

    /// Publish a notification under this client's identity.
    pub fn publish(&self, subject: &Topic, payloads: &[Payload]) -> Result<()> {
        self.messages.publish(subject, payloads)
    }

    pub fn register_message_handler(
        &self,
        source: &Identity,
        subject: &Topic,
        callback: MessageCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<Registration> {
        self.messages
            .register_message_handler(source, subject, callback, on_error)
    }

    pub fn unregister_message_handler(
        &self,
        source: &Identity,
        subject: &Topic,
        callback: &MessageCallback,
    ) -> bool {
        self.messages
            .unregister_message_handler(source, subject, callback)
    }

    pub fn register_request_handler(
        &self,
        subject: &Topic,
        callback: RequestCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<()> {
        self.rpc.register_request_handler(subject, callback, on_error)
    }

    pub fn unregister_request_handler(&self, subject: &Topic) -> bool {
        self.rpc.unregister_request_handler(subject)
    }

    pub fn register_reply_handler(
        &self,
        subject: &Topic,
        callback: ReplyCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<Registration> {
        self.rpc.register_reply_handler(subject, callback, on_error)
    }

    pub fn unregister_reply_handler(&self, subject: &Topic, callback: &ReplyCallback) -> bool {
        self.rpc.unregister_reply_handler(subject, callback)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send_request(
        &self,
        destination: &Destination,
        subject: &Topic,
        payloads: Vec<Payload>,
        expected: ReplyCount,
        timeout: Duration,
        on_reply: ReplyCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<CorrelationId> {
        self.requester
            .send_request(destination, subject, payloads, expected, timeout, on_reply, on_error)
    }

    /// [`send_request`](Self::send_request) with the configured default timeout.
    pub fn send_request_default(
        &self,
        destination: &Destination,
        subject: &Topic,
        payloads: Vec<Payload>,
        expected: ReplyCount,
        on_reply: ReplyCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<CorrelationId> {
        self.send_request(
            destination,
            subject,
            payloads,
            expected,
            self.config.default_timeout_duration(),
            on_reply,
            on_error,
        )
    }

    /// Disconnect and shut the worker pool down. There is no restart.
    pub fn shutdown(&self) -> ShutdownReport {
        if self.is_connected() {
            if let Err(e) = self.disconnect() {
                log::warn!("[client] disconnect during shutdown failed: {}", e);
            }
        }
        let report = self.context.executors().shutdown();
        log::info!("[client] {} shut down: {:?}", self.identity(), report);
        report
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Handlers hold the context, so the tree must be emptied explicitly.
        self.context.dispatcher().clear();
    }
}
