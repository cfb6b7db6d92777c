// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-way notifications.
//!
//! A client publishes under its own identity
//! (`..., msg, ownGroup, ownClient, subject...`) and listens to the subjects
//! of the sources it is interested in.

use crate::callback::{CallbackExecutor, ErrorCallback, MessageCallback};
use crate::codec::{Header, Payload};
use crate::context::ClientContext;
use crate::dispatch::Registration;
use crate::error::{LabmeshError, Result};
use crate::topic::{Identity, Topic, TransmissionKind};
use std::sync::Arc;

struct MessageExecutor {
    callback: MessageCallback,
}

impl CallbackExecutor for MessageExecutor {
    fn handle(&self, header: &Header, payloads: &[Payload]) -> anyhow::Result<Vec<Payload>> {
        (self.callback)(header, payloads)?;
        Ok(Vec::new())
    }
}

/// Notification publishing and handler registry.
pub struct MessageHandlers {
    context: ClientContext,
}

impl MessageHandlers {
    #[must_use]
    pub fn new(context: ClientContext) -> Self {
        Self { context }
    }

    /// Publish a notification under this client's identity.
    pub fn publish(&self, subject: &Topic, payloads: &[Payload]) -> Result<()> {
        let topic = self
            .context
            .addresses()
            .message(self.context.identity(), subject);
        let header = self.context.header(TransmissionKind::Msg, subject);
        self.context.publish(&topic, &header, payloads)
    }

    /// Listen to `subject` as published by `source`. Several callbacks may
    /// share a subject; registering the same callback twice is a no-op.
    pub fn register_message_handler(
        &self,
        source: &Identity,
        subject: &Topic,
        callback: MessageCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<Registration> {
        let path = self.context.addresses().message(source, subject);
        let executor = Arc::new(MessageExecutor {
            callback: Arc::clone(&callback),
        });
        let handler = self
            .context
            .callback_handler(&path, &callback, executor, on_error);
        match self.context.dispatcher().add_handler(path.segments(), handler) {
            Registration::Rejected => Err(LabmeshError::Unroutable(path.to_string())),
            outcome => {
                log::debug!("[client] message handler at '{}': {:?}", path, outcome);
                Ok(outcome)
            }
        }
    }

    pub fn unregister_message_handler(
        &self,
        source: &Identity,
        subject: &Topic,
        callback: &MessageCallback,
    ) -> bool {
        let path = self.context.addresses().message(source, subject);
        let executor = Arc::new(MessageExecutor {
            callback: Arc::clone(callback),
        });
        let probe = self.context.callback_handler(&path, callback, executor, None);
        self.context
            .dispatcher()
            .remove_handler(path.segments(), &probe)
    }
}
