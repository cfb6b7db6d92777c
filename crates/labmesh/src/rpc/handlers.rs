// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request and reply handler registration.
//!
//! Request handlers live under this client's request node, one per subject.
//! Every handled request emits exactly one reply through the
//! [`ReplyPublisher`], even when the handler fails.

use crate::callback::{CallbackExecutor, ErrorCallback, HandlerOutcome, ReplyCallback, RequestCallback};
use crate::codec::{Header, Payload};
use crate::context::ClientContext;
use crate::dispatch::{Registration, RpcReplySegments, RpcRequestSegments};
use crate::error::{ErrorPayload, LabmeshError, Result};
use crate::topic::{Destination, Identity, Topic, TransmissionKind};
use parking_lot::Mutex;
use std::sync::Arc;

/// Publishes replies on behalf of a request executor.
#[derive(Clone)]
pub struct ReplyPublisher {
    context: ClientContext,
}

impl ReplyPublisher {
    #[must_use]
    pub fn new(context: ClientContext) -> Self {
        Self { context }
    }

    /// Send `payloads` back to the sender of `request`.
    ///
    /// Nothing is published unless the sender, subject and correlation id
    /// form a valid reply address.
    pub fn publish_reply(&self, request: &Header, payloads: &[Payload]) -> Result<()> {
        let correlation_id = request
            .correlation_id
            .as_deref()
            .ok_or_else(|| LabmeshError::Codec("request has no correlation id".into()))?;
        Topic::new([correlation_id])?;
        let sender = Identity::new(request.sender.group.as_str(), request.sender.client.as_str())?;
        let subject = Topic::new(request.subject.iter().cloned())?;
        let topic = self
            .context
            .addresses()
            .reply(&sender, &subject, correlation_id);
        let header = self
            .context
            .header(TransmissionKind::Rep, &subject)
            .with_correlation_id(correlation_id);
        self.context.publish(&topic, &header, payloads)
    }
}

/// Runs a request callback and always answers.
pub(crate) struct RequestExecutor {
    callback: RequestCallback,
    publisher: ReplyPublisher,
}

impl RequestExecutor {
    pub(crate) fn new(callback: RequestCallback, publisher: ReplyPublisher) -> Self {
        Self {
            callback,
            publisher,
        }
    }
}

impl CallbackExecutor for RequestExecutor {
    fn validate(&self, header: &Header, _payloads: &[Payload], errors: &mut Vec<ErrorPayload>) {
        match header.correlation_id.as_deref() {
            None => errors.push(ErrorPayload::validation("request has no correlation id")),
            Some(id) if Topic::new([id]).is_err() => errors.push(ErrorPayload::validation(format!(
                "request correlation id '{}' is not a single topic segment",
                id
            ))),
            Some(_) => {}
        }
        if Identity::new(header.sender.group.as_str(), header.sender.client.as_str()).is_err() {
            errors.push(ErrorPayload::validation(format!(
                "request sender '{}' is not a valid identity",
                header.sender
            )));
        }
        if Topic::new(header.subject.iter().cloned()).is_err() {
            errors.push(ErrorPayload::validation("request subject is not a valid topic"));
        }
    }

    fn handle(&self, header: &Header, payloads: &[Payload]) -> anyhow::Result<Vec<Payload>> {
        (self.callback)(header, payloads)
    }

    fn complete(&self, header: &Header, outcome: &HandlerOutcome, errors: &mut Vec<ErrorPayload>) {
        let mut reply = match outcome {
            HandlerOutcome::Completed(payloads) if payloads.is_empty() && errors.is_empty() => {
                vec![Payload::status_ok()]
            }
            HandlerOutcome::Completed(payloads) => payloads.clone(),
            HandlerOutcome::Faulted => Vec::new(),
        };
        reply.extend(errors.iter().map(Payload::error));

        if let Err(e) = self.publisher.publish_reply(header, &reply) {
            log::warn!("[rpc] reply to {} not sent: {}", header.sender, e);
            errors.push(ErrorPayload::processing(format!("reply not sent: {}", e)));
        }
    }
}

/// Runs a reply callback.
pub(crate) struct ReplyExecutor {
    callback: ReplyCallback,
}

impl ReplyExecutor {
    pub(crate) fn new(callback: ReplyCallback) -> Self {
        Self { callback }
    }
}

impl CallbackExecutor for ReplyExecutor {
    fn validate(&self, _header: &Header, payloads: &[Payload], errors: &mut Vec<ErrorPayload>) {
        if payloads.is_empty() {
            errors.push(ErrorPayload::empty_payload("reply carries no payload"));
        }
    }

    fn handle(&self, header: &Header, payloads: &[Payload]) -> anyhow::Result<Vec<Payload>> {
        if !payloads.is_empty() {
            (self.callback)(header, payloads)?;
        }
        Ok(Vec::new())
    }
}

/// Registry of this client's request and reply handlers.
pub struct RequestReplyHandlers {
    context: ClientContext,
    publisher: ReplyPublisher,
    registration: Mutex<()>,
}

impl RequestReplyHandlers {
    /// Installs the request and reply nodes for this client's identity.
    pub fn new(context: ClientContext) -> Result<Self> {
        let identity = context.identity().clone();
        let dispatcher = context.dispatcher();
        let request_base = context.addresses().base(TransmissionKind::Req);
        let reply_base = context.addresses().base(TransmissionKind::Rep);

        dispatcher
            .add_dispatcher(&request_base, Arc::new(RpcRequestSegments::new(identity.clone())))
            .ok_or_else(|| LabmeshError::Unroutable(request_base.join("/")))?;
        dispatcher
            .add_dispatcher(&reply_base, Arc::new(RpcReplySegments::new(identity)))
            .ok_or_else(|| LabmeshError::Unroutable(reply_base.join("/")))?;

        Ok(Self {
            publisher: ReplyPublisher::new(context.clone()),
            context,
            registration: Mutex::new(()),
        })
    }

    fn request_path(&self, subject: &Topic) -> Topic {
        let me = Destination::from(self.context.identity());
        self.context.addresses().request(&me, subject)
    }

    fn reply_path(&self, subject: &Topic) -> Topic {
        self.context
            .addresses()
            .reply_base(self.context.identity(), subject)
    }

    /// Install the single request handler for `subject`.
    ///
    /// Fails with [`LabmeshError::DuplicateHandler`] if one is already
    /// installed; the existing handler stays.
    pub fn register_request_handler(
        &self,
        subject: &Topic,
        callback: RequestCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<()> {
        let path = self.request_path(subject);
        let _guard = self.registration.lock();

        let dispatcher = self.context.dispatcher();
        if dispatcher
            .get_dispatcher(path.segments())
            .is_some_and(|node| node.handler_count() > 0)
        {
            return Err(LabmeshError::DuplicateHandler(path.to_string()));
        }

        let executor = Arc::new(RequestExecutor::new(
            Arc::clone(&callback),
            self.publisher.clone(),
        ));
        let handler = self
            .context
            .callback_handler(&path, &callback, executor, on_error);
        match dispatcher.add_handler(path.segments(), handler) {
            Registration::Added => {
                log::debug!("[rpc] request handler installed at '{}'", path);
                Ok(())
            }
            Registration::AlreadyPresent => Err(LabmeshError::DuplicateHandler(path.to_string())),
            Registration::Rejected => Err(LabmeshError::Unroutable(path.to_string())),
        }
    }

    /// Remove the request handler for `subject`.
    pub fn unregister_request_handler(&self, subject: &Topic) -> bool {
        let path = self.request_path(subject);
        let _guard = self.registration.lock();
        self.context.dispatcher().remove_handlers(path.segments()) > 0
    }

    /// Register a reply handler. `subject` includes the correlation id as its
    /// last segment. Several handlers may share a subject; registering the
    /// same callback twice is a no-op.
    pub fn register_reply_handler(
        &self,
        subject: &Topic,
        callback: ReplyCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<Registration> {
        let path = self.reply_path(subject);
        let executor = Arc::new(ReplyExecutor::new(Arc::clone(&callback)));
        let handler = self
            .context
            .callback_handler(&path, &callback, executor, on_error);
        match self.context.dispatcher().add_handler(path.segments(), handler) {
            Registration::Rejected => Err(LabmeshError::Unroutable(path.to_string())),
            outcome => Ok(outcome),
        }
    }

    pub fn unregister_reply_handler(&self, subject: &Topic, callback: &ReplyCallback) -> bool {
        let path = self.reply_path(subject);
        let executor = Arc::new(ReplyExecutor::new(Arc::clone(callback)));
        let candidate = self.context.callback_handler(&path, callback, executor, None);
        self.context
            .dispatcher()
            .remove_handler(path.segments(), &candidate)
    }
}
