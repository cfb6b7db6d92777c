// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/reply over addressed publish/subscribe topics.
//!
//! # Topic Naming
//!
//! For subject `ping` in application `cosim` under prefix `lab`:
//! - Request to one client: `lab/cosim/req/<group>/<client>/ping`
//! - Request to a group: `lab/cosim/req/<group>/*/ping`
//! - Request to everyone: `lab/cosim/req/*/*/ping`
//! - Reply: `lab/cosim/rep/<requester group>/<requester client>/ping/<correlation id>`
//!
//! # Correlation
//!
//! Each request carries a fresh [`CorrelationId`] in its header and in the
//! reply address it expects. The requester listens on that reply address for
//! the duration of the call only.

mod handlers;
mod latch;
mod requester;
mod types;

pub use handlers::{ReplyPublisher, RequestReplyHandlers};
pub use latch::CountdownLatch;
pub use requester::{PendingRequest, Requester, RequesterStats, RequesterStatsSnapshot};
pub use types::{CorrelationId, ReplyCount, CORRELATION_ID_LEN};

#[cfg(test)]
mod tests;
