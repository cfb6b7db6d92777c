// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Callback execution subsystem.
//!
//! The transport thread only enqueues: a [`CallbackHandler`] registered in
//! the dispatch tree wraps every delivery into a job for the
//! [`CallbackExecutorManager`]. On a worker the job decodes the packet,
//! separates error payloads, runs the user callback inside a fault boundary
//! and reports accumulated errors once.

mod handler;
mod job;
mod manager;

pub use handler::{callback_key, CallbackHandler};
pub(crate) use job::panic_message;
pub use job::{CallbackExecutor, CallbackJob, HandlerOutcome, JobReport};
pub use manager::{CallbackExecutorManager, ShutdownReport};

use crate::codec::{Header, Payload};
use crate::error::ErrorPayload;
use crate::topic::Topic;
use std::sync::Arc;

/// Callback for notifications and RPC replies.
pub type MessageCallback = Arc<dyn Fn(&Header, &[Payload]) -> anyhow::Result<()> + Send + Sync>;

/// Callback for RPC replies.
pub type ReplyCallback = MessageCallback;

/// Callback for RPC requests; the returned payloads form the reply.
pub type RequestCallback =
    Arc<dyn Fn(&Header, &[Payload]) -> anyhow::Result<Vec<Payload>> + Send + Sync>;

/// Receives the errors accumulated by one job, or a request timeout.
pub type ErrorCallback = Arc<dyn Fn(&Topic, &[ErrorPayload]) + Send + Sync>;
