// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic handler that turns raw deliveries into callback jobs.

use super::job::{CallbackExecutor, CallbackJob};
use super::manager::CallbackExecutorManager;
use super::ErrorCallback;
use crate::codec::PacketCodec;
use crate::dispatch::TopicHandler;
use crate::topic::Topic;
use std::any::Any;
use std::sync::Arc;

/// Identity of a user callback, used to recognise re-registrations.
#[must_use]
pub fn callback_key<T: ?Sized>(callback: &Arc<T>) -> usize {
    Arc::as_ptr(callback) as *const () as usize
}

/// Enqueues one [`CallbackJob`] per delivery; decoding happens on the worker.
///
/// Two handlers are equivalent when they serve the same subject path with the
/// same user callback.
pub struct CallbackHandler {
    path: Vec<String>,
    callback_key: usize,
    codec: Arc<dyn PacketCodec>,
    executor: Arc<dyn CallbackExecutor>,
    on_error: Option<ErrorCallback>,
    executors: Arc<CallbackExecutorManager>,
}

impl CallbackHandler {
    pub fn new(
        path: Vec<String>,
        callback_key: usize,
        codec: Arc<dyn PacketCodec>,
        executor: Arc<dyn CallbackExecutor>,
        on_error: Option<ErrorCallback>,
        executors: Arc<CallbackExecutorManager>,
    ) -> Self {
        Self {
            path,
            callback_key,
            codec,
            executor,
            on_error,
            executors,
        }
    }

    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

impl TopicHandler for CallbackHandler {
    fn handle(&self, topic: &[String], payload: &[u8]) {
        let topic = Topic::from_segments(topic.to_vec());
        let bytes = payload.to_vec();
        let codec = Arc::clone(&self.codec);
        let executor = Arc::clone(&self.executor);
        let on_error = self.on_error.clone();

        let submitted = self.executors.submit(move || {
            let packet = codec.decode(&bytes);
            CallbackJob::new(topic, packet, executor, on_error).run();
        });
        if let Err(e) = submitted {
            log::warn!("[executor] dropped message on '{}': {}", self.path.join("/"), e);
        }
    }

    fn equivalent(&self, other: &dyn TopicHandler) -> bool {
        other
            .as_any()
            .downcast_ref::<CallbackHandler>()
            .is_some_and(|other| other.path == self.path && other.callback_key == self.callback_key)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
