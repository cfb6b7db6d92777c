// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Addressed dispatch tree.
//!
//! Inbound topics are matched segment by segment against a tree of
//! [`DispatchNode`]s rooted at the [`RootDispatcher`]. Each node is selected
//! by one segment and may consume more through its [`SegmentStrategy`]
//! (RPC nodes consume the addressed group and client). When the segments run
//! out, every [`TopicHandler`] registered at that node receives the raw
//! bytes.

mod handler;
mod node;
mod root;
mod strategy;

pub use handler::{FnHandler, Registration, TopicHandler};
pub use node::DispatchNode;
pub use root::{DispatchMetrics, DispatchStats, RootDispatcher};
pub use strategy::{PlainSegments, RpcReplySegments, RpcRequestSegments, SegmentStrategy};
