// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collaborators shared by the messaging and RPC layers of one client.

use crate::callback::{callback_key, CallbackExecutor, CallbackExecutorManager, CallbackHandler, ErrorCallback};
use crate::codec::{Header, PacketCodec, Payload};
use crate::dispatch::{RootDispatcher, TopicHandler};
use crate::error::Result;
use crate::topic::{AddressBuilder, Identity, Topic, TransmissionKind};
use std::sync::Arc;

/// Identity, addressing and the explicitly injected runtime pieces.
#[derive(Clone)]
pub struct ClientContext {
    identity: Identity,
    addresses: AddressBuilder,
    dispatcher: Arc<RootDispatcher>,
    codec: Arc<dyn PacketCodec>,
    executors: Arc<CallbackExecutorManager>,
}

impl ClientContext {
    pub fn new(
        identity: Identity,
        addresses: AddressBuilder,
        dispatcher: Arc<RootDispatcher>,
        codec: Arc<dyn PacketCodec>,
        executors: Arc<CallbackExecutorManager>,
    ) -> Self {
        Self {
            identity,
            addresses,
            dispatcher,
            codec,
            executors,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn addresses(&self) -> &AddressBuilder {
        &self.addresses
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<RootDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn codec(&self) -> &Arc<dyn PacketCodec> {
        &self.codec
    }

    #[must_use]
    pub fn executors(&self) -> &Arc<CallbackExecutorManager> {
        &self.executors
    }

    /// Header sent by this client.
    #[must_use]
    pub fn header(&self, kind: TransmissionKind, subject: &Topic) -> Header {
        Header::new(self.identity.clone(), kind, subject.segments().to_vec())
    }

    /// Encode and publish one packet.
    pub fn publish(&self, topic: &Topic, header: &Header, payloads: &[Payload]) -> Result<()> {
        let bytes = self.codec.encode(header, payloads)?;
        self.dispatcher.transport().publish(topic.segments(), &bytes)?;
        Ok(())
    }

    /// Callback-backed topic handler for `path`, keyed by `callback` for
    /// duplicate detection.
    pub(crate) fn callback_handler<T: ?Sized>(
        &self,
        path: &Topic,
        callback: &Arc<T>,
        executor: Arc<dyn CallbackExecutor>,
        on_error: Option<ErrorCallback>,
    ) -> Arc<dyn TopicHandler> {
        Arc::new(CallbackHandler::new(
            path.segments().to_vec(),
            callback_key(callback),
            Arc::clone(&self.codec),
            executor,
            on_error,
            Arc::clone(&self.executors),
        ))
    }
}
