// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-node segment consumption rules.
//!
//! A [`DispatchNode`](super::DispatchNode) is selected from its parent by one
//! segment (its key). Before looking up a child it may consume further
//! segments: plain nodes consume none, RPC nodes consume the addressed
//! (group, client) pair. The same strategy also decides which transport
//! patterns the node stands for.

use crate::topic::{Identity, ALL_LEVELS, ANY};
use std::fmt;

/// How a dispatch node consumes address segments.
pub trait SegmentStrategy: Send + Sync + fmt::Debug {
    /// Consume the segments belonging to this node starting at `pos`.
    ///
    /// Returns the position of the first unconsumed segment, or `None` when
    /// the segments are not accepted by this node.
    fn consume(&self, segments: &[String], pos: usize) -> Option<usize>;

    /// Expand the topic prefix ending at this node's key into the concrete
    /// prefixes a subscription must cover.
    fn expand(&self, prefix: &[String]) -> Vec<Vec<String>> {
        vec![prefix.to_vec()]
    }

    /// Persistent nodes are never pruned when they run empty.
    fn persistent(&self) -> bool {
        false
    }
}

/// Plain node: selected by its key, consumes nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSegments;

impl SegmentStrategy for PlainSegments {
    #[inline]
    fn consume(&self, _segments: &[String], pos: usize) -> Option<usize> {
        Some(pos)
    }
}

fn consume_pair(segments: &[String], pos: usize, accept: impl Fn(&str, &str) -> bool) -> Option<usize> {
    let group = segments.get(pos)?;
    let client = segments.get(pos + 1)?;
    accept(group, client).then_some(pos + 2)
}

fn with_pair(prefix: &[String], group: &str, client: &str) -> Vec<String> {
    let mut segments = Vec::with_capacity(prefix.len() + 2);
    segments.extend(prefix.iter().cloned());
    segments.push(group.to_string());
    segments.push(client.to_string());
    segments
}

/// RPC request node: accepts requests addressed to this client, its whole
/// group, or everyone.
///
/// A group or client segment is accepted when it equals this client's own
/// value or is literally the [`ANY`] token.
#[derive(Debug, Clone)]
pub struct RpcRequestSegments {
    identity: Identity,
}

impl RpcRequestSegments {
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl SegmentStrategy for RpcRequestSegments {
    fn consume(&self, segments: &[String], pos: usize) -> Option<usize> {
        consume_pair(segments, pos, |group, client| {
            (group == self.identity.group || group == ANY)
                && (client == self.identity.client || client == ANY)
        })
    }

    /// Exact identity, any client of the group, any group and client.
    fn expand(&self, prefix: &[String]) -> Vec<Vec<String>> {
        vec![
            with_pair(prefix, &self.identity.group, &self.identity.client),
            with_pair(prefix, &self.identity.group, ANY),
            with_pair(prefix, ANY, ANY),
        ]
    }

    fn persistent(&self) -> bool {
        true
    }
}

/// RPC reply node: replies are only ever addressed to this exact client.
#[derive(Debug, Clone)]
pub struct RpcReplySegments {
    identity: Identity,
}

impl RpcReplySegments {
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl SegmentStrategy for RpcReplySegments {
    fn consume(&self, segments: &[String], pos: usize) -> Option<usize> {
        consume_pair(segments, pos, |group, client| {
            group == self.identity.group && client == self.identity.client
        })
    }

    fn expand(&self, prefix: &[String]) -> Vec<Vec<String>> {
        vec![with_pair(prefix, &self.identity.group, &self.identity.client)]
    }

    fn persistent(&self) -> bool {
        true
    }
}

/// Subscription pattern covering `prefix` and everything below it.
pub(crate) fn subtree_pattern(mut prefix: Vec<String>) -> Vec<String> {
    prefix.push(ALL_LEVELS.to_string());
    prefix
}
