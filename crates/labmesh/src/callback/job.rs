// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One unit of callback work.

use super::ErrorCallback;
use crate::codec::{DecodedPacket, Header, Payload};
use crate::error::ErrorPayload;
use crate::topic::Topic;
use std::any::Any;
use std::sync::Arc;

/// Result of running the user handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Handler returned normally with these payloads.
    Completed(Vec<Payload>),
    /// Handler returned an error or panicked.
    Faulted,
}

/// Behaviour of one kind of callback job.
pub trait CallbackExecutor: Send + Sync + 'static {
    /// Inspect the packet before the handler runs. Problems are appended to
    /// `errors`; the handler still runs.
    fn validate(&self, _header: &Header, _payloads: &[Payload], _errors: &mut Vec<ErrorPayload>) {}

    /// Run the user handler.
    fn handle(&self, header: &Header, payloads: &[Payload]) -> anyhow::Result<Vec<Payload>>;

    /// Runs after the handler, whatever its outcome.
    fn complete(&self, _header: &Header, _outcome: &HandlerOutcome, _errors: &mut Vec<ErrorPayload>) {}
}

/// What a job did.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    /// The handler was invoked.
    pub handled: bool,
    pub faulted: bool,
    /// Errors passed to the error callback.
    pub errors: Vec<ErrorPayload>,
}

/// A decoded inbound packet bound to the executor that handles it.
pub struct CallbackJob {
    topic: Topic,
    packet: DecodedPacket,
    executor: Arc<dyn CallbackExecutor>,
    on_error: Option<ErrorCallback>,
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl CallbackJob {
    pub fn new(
        topic: Topic,
        packet: DecodedPacket,
        executor: Arc<dyn CallbackExecutor>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            topic,
            packet,
            executor,
            on_error,
        }
    }

    /// Run the job to completion on the calling thread.
    pub fn run(self) -> JobReport {
        let DecodedPacket {
            header,
            payloads,
            mut errors,
        } = self.packet;

        let (Some(header), Some(payloads)) = (header, payloads) else {
            if errors.is_empty() {
                errors.push(ErrorPayload::decoding("packet could not be decoded"));
            }
            log::debug!("[executor] undecodable packet on '{}'", self.topic);
            report(&self.topic, &errors, self.on_error.as_ref());
            return JobReport {
                handled: false,
                faulted: false,
                errors,
            };
        };

        let mut body = Vec::with_capacity(payloads.len());
        for payload in payloads {
            if payload.is_error() {
                match payload.as_error() {
                    Some(error) => errors.push(error),
                    None => errors.push(ErrorPayload::decoding("malformed error payload")),
                }
            } else {
                body.push(payload);
            }
        }

        self.executor.validate(&header, &body, &mut errors);

        let executor = &self.executor;
        let outcome = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            executor.handle(&header, &body)
        })) {
            Ok(Ok(payloads)) => HandlerOutcome::Completed(payloads),
            Ok(Err(e)) => {
                errors.push(ErrorPayload::processing(format!("{:#}", e)));
                HandlerOutcome::Faulted
            }
            Err(panic) => {
                errors.push(ErrorPayload::processing(panic_message(panic.as_ref())));
                HandlerOutcome::Faulted
            }
        };

        self.executor.complete(&header, &outcome, &mut errors);
        report(&self.topic, &errors, self.on_error.as_ref());

        JobReport {
            handled: true,
            faulted: outcome == HandlerOutcome::Faulted,
            errors,
        }
    }
}

fn report(topic: &Topic, errors: &[ErrorPayload], on_error: Option<&ErrorCallback>) {
    if errors.is_empty() {
        return;
    }
    match on_error {
        Some(on_error) => {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                on_error(topic, errors);
            }));
            if result.is_err() {
                log::warn!("[executor] error callback panicked for '{}'", topic);
            }
        }
        None => log::warn!(
            "[executor] {} unreported error(s) on '{}': {}",
            errors.len(),
            topic,
            errors[0]
        ),
    }
}
