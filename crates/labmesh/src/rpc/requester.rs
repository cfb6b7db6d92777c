// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound requests and reply correlation.
//!
//! `send_request` returns the correlation id immediately; the call itself
//! runs as a [`PendingRequest`] on a callback worker:
//!
//! 1. register an ephemeral node at the reply address
//!    (`..., rep, ownGroup, ownClient, subject..., correlationId`) carrying the
//!    user's reply handler and, for a finite count, a countdown handler;
//! 2. publish the request;
//! 3. wait for the countdown or the timeout (unlimited requests always wait
//!    the full timeout);
//! 4. report a timeout if replies are missing;
//! 5. remove the ephemeral node, whatever happened.

use super::handlers::ReplyExecutor;
use super::latch::CountdownLatch;
use super::types::{CorrelationId, ReplyCount};
use crate::callback::{ErrorCallback, ReplyCallback};
use crate::codec::Payload;
use crate::context::ClientContext;
use crate::dispatch::{Registration, TopicHandler};
use crate::error::{ErrorPayload, Result};
use crate::topic::{Destination, Topic, TransmissionKind};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Requester counters.
#[derive(Debug, Default)]
pub struct RequesterStats {
    pub requests_sent: AtomicU64,
    pub requests_completed: AtomicU64,
    pub requests_timed_out: AtomicU64,
    pub requests_failed: AtomicU64,
    /// Ephemeral reply nodes removed.
    pub reply_nodes_removed: AtomicU64,
}

impl RequesterStats {
    #[must_use]
    pub fn snapshot(&self) -> RequesterStatsSnapshot {
        RequesterStatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_completed: self.requests_completed.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            reply_nodes_removed: self.reply_nodes_removed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RequesterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequesterStatsSnapshot {
    pub requests_sent: u64,
    pub requests_completed: u64,
    pub requests_timed_out: u64,
    pub requests_failed: u64,
    pub reply_nodes_removed: u64,
}

/// Counts reply arrivals on the transport thread.
struct CountdownHandler {
    latch: Arc<CountdownLatch>,
}

impl TopicHandler for CountdownHandler {
    fn handle(&self, _topic: &[String], _payload: &[u8]) {
        self.latch.count_down();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Removes the reply subtree when dropped.
struct EphemeralReplyNode<'a> {
    context: &'a ClientContext,
    path: &'a Topic,
    stats: &'a RequesterStats,
}

impl Drop for EphemeralReplyNode<'_> {
    fn drop(&mut self) {
        if self.context.dispatcher().remove_dispatcher(self.path.segments()) {
            self.stats.reply_nodes_removed.fetch_add(1, Ordering::Relaxed);
            log::debug!("[rpc] reply node '{}' removed", self.path);
        }
    }
}

/// One in-flight request.
pub struct PendingRequest {
    correlation_id: CorrelationId,
    destination: Destination,
    subject: Topic,
    payloads: Vec<Payload>,
    expected: ReplyCount,
    timeout: Duration,
    on_reply: ReplyCallback,
    on_error: Option<ErrorCallback>,
    context: ClientContext,
    stats: Arc<RequesterStats>,
}

impl PendingRequest {
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Run the request to completion on the calling thread.
    pub fn run(self) {
        let reply_topic = self.context.addresses().reply(
            self.context.identity(),
            &self.subject,
            self.correlation_id.as_str(),
        );

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.exchange(&reply_topic)));
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(panic) => Some(ErrorPayload::processing(crate::callback::panic_message(
                panic.as_ref(),
            ))),
        };

        match failure {
            None => {}
            Some(error) if error.code == crate::error::ErrorCode::Timeout => {
                self.stats.requests_timed_out.fetch_add(1, Ordering::Relaxed);
                self.report(&reply_topic, error);
            }
            Some(error) => {
                self.stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                self.report(&reply_topic, error);
            }
        }
    }

    fn report(&self, topic: &Topic, error: ErrorPayload) {
        log::debug!("[rpc] request {} failed: {}", self.correlation_id, error);
        match &self.on_error {
            Some(on_error) => {
                let errors = [error];
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| on_error(topic, &errors))).is_err() {
                    log::warn!("[rpc] error callback panicked for request {}", self.correlation_id);
                }
            }
            None => log::warn!("[rpc] request {} failed: {}", self.correlation_id, error),
        }
    }

    fn exchange(&self, reply_topic: &Topic) -> std::result::Result<(), ErrorPayload> {
        let dispatcher = self.context.dispatcher();
        let _cleanup = EphemeralReplyNode {
            context: &self.context,
            path: reply_topic,
            stats: &self.stats,
        };

        let executor = Arc::new(ReplyExecutor::new(Arc::clone(&self.on_reply)));
        let reply_handler = self.context.callback_handler(
            reply_topic,
            &self.on_reply,
            executor,
            self.on_error.clone(),
        );
        if dispatcher.add_handler(reply_topic.segments(), reply_handler) == Registration::Rejected {
            return Err(ErrorPayload::processing(format!(
                "reply address '{}' is not routable",
                reply_topic
            )));
        }

        let latch = self.expected.finite().map(|count| Arc::new(CountdownLatch::new(count)));
        if let Some(latch) = &latch {
            let countdown: Arc<dyn TopicHandler> = Arc::new(CountdownHandler {
                latch: Arc::clone(latch),
            });
            if dispatcher.add_handler(reply_topic.segments(), countdown) != Registration::Added {
                return Err(ErrorPayload::processing(format!(
                    "reply countdown for '{}' not installed",
                    reply_topic
                )));
            }
        }

        let request_topic = self
            .context
            .addresses()
            .request(&self.destination, &self.subject);
        let header = self
            .context
            .header(TransmissionKind::Req, &self.subject)
            .with_correlation_id(self.correlation_id.as_str());
        self.context
            .publish(&request_topic, &header, &self.payloads)
            .map_err(|e| ErrorPayload::processing(format!("request not sent: {}", e)))?;
        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "[rpc] request {} sent to '{}' expecting {}",
            self.correlation_id,
            request_topic,
            self.expected
        );

        match latch {
            Some(latch) => {
                if !latch.wait_timeout(self.timeout) {
                    let expected = self.expected.finite().unwrap_or_default();
                    let received = expected - latch.count();
                    return Err(ErrorPayload::timeout(format!(
                        "request {} timed out after {:?}: received {} of {} replies",
                        self.correlation_id, self.timeout, received, expected
                    )));
                }
            }
            None => std::thread::sleep(self.timeout),
        }
        self.stats.requests_completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Issues requests on behalf of one client.
pub struct Requester {
    context: ClientContext,
    stats: Arc<RequesterStats>,
}

impl Requester {
    #[must_use]
    pub fn new(context: ClientContext) -> Self {
        Self {
            context,
            stats: Arc::new(RequesterStats::default()),
        }
    }

    #[must_use]
    pub fn stats(&self) -> RequesterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Build the pending request without scheduling it.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn prepare(
        &self,
        destination: &Destination,
        subject: &Topic,
        payloads: Vec<Payload>,
        expected: ReplyCount,
        timeout: Duration,
        on_reply: ReplyCallback,
        on_error: Option<ErrorCallback>,
    ) -> PendingRequest {
        PendingRequest {
            correlation_id: CorrelationId::generate(),
            destination: destination.clone(),
            subject: subject.clone(),
            payloads,
            expected,
            timeout,
            on_reply,
            on_error,
            context: self.context.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Send a request and return its correlation id at once.
    ///
    /// Replies arrive through `on_reply`; timeouts and failures only through
    /// `on_error`. Fails immediately only when the executor is shut down.
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
        let pending = self.prepare(destination, subject, payloads, expected, timeout, on_reply, on_error);
        let correlation_id = pending.correlation_id().clone();
        self.context.executors().submit(move || pending.run())?;
        Ok(correlation_id)
    }
}
