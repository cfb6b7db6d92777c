// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Root of the dispatch tree.
//!
//! Owns the transport handle, receives inbound traffic as the transport's
//! [`MessageSink`], and keeps the transport subscriptions in line with the
//! handler-bearing subtrees of the tree.
//!
//! Subscriptions are owned by the topmost handler-bearing node of each
//! subtree. They change only when a node gains its first handler or loses
//! its last one, and the work touches that node's ancestors and subtree,
//! never unrelated parts of the tree.

use super::handler::{Registration, TopicHandler};
use super::node::{DispatchNode, Walk};
use super::strategy::{subtree_pattern, PlainSegments, SegmentStrategy};
use crate::transport::{MessageSink, Transport};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub messages_dispatched: AtomicU64,
    pub messages_orphaned: AtomicU64,
    pub handler_invocations: AtomicU64,
    pub handler_panics: AtomicU64,
}

impl DispatchMetrics {
    #[must_use]
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            messages_orphaned: self.messages_orphaned.load(Ordering::Relaxed),
            handler_invocations: self.handler_invocations.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub messages_dispatched: u64,
    pub messages_orphaned: u64,
    pub handler_invocations: u64,
    pub handler_panics: u64,
}

/// Root dispatcher.
pub struct RootDispatcher {
    root: Arc<DispatchNode>,
    transport: Arc<dyn Transport>,
    metrics: DispatchMetrics,
}

impl RootDispatcher {
    /// Create the dispatcher and install it as the transport's sink.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            root: DispatchNode::root(),
            transport,
            metrics: DispatchMetrics::default(),
        });
        let sink: Weak<dyn MessageSink> = Arc::downgrade(&dispatcher) as Weak<dyn MessageSink>;
        dispatcher.transport.set_sink(sink);
        dispatcher
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    #[must_use]
    pub fn metrics(&self) -> DispatchStats {
        self.metrics.snapshot()
    }

    fn lookup(&self, path: &[String]) -> Option<(Arc<DispatchNode>, bool)> {
        loop {
            match self.root.find(path, 0) {
                Walk::Found { node, consumed } => return Some((node, consumed)),
                Walk::Missing => return None,
                Walk::Detached => log::trace!("[dispatch] lookup raced with prune, retrying"),
            }
        }
    }

    fn ensure(&self, path: &[String], strategy: &Arc<dyn SegmentStrategy>) -> Option<Arc<DispatchNode>> {
        loop {
            match self.root.ensure(path, 0, strategy) {
                Walk::Found { node, .. } => return Some(node),
                Walk::Missing => return None,
                Walk::Detached => log::trace!("[dispatch] registration raced with prune, retrying"),
            }
        }
    }

    /// Create (or reuse) the nodes along `path`; the last one gets `strategy`
    /// if it has to be created. Only wires tree shape: no handler is added
    /// and no subscription is issued.
    ///
    /// Returns `None` if an existing node on the way rejects the path.
    pub fn add_dispatcher(
        &self,
        path: &[String],
        strategy: Arc<dyn SegmentStrategy>,
    ) -> Option<Arc<DispatchNode>> {
        self.ensure(path, &strategy)
    }

    /// Clear the handlers of the node at `path` and prune it together with
    /// every ancestor left without handlers or children. Children registered
    /// below `path` stay, and persistent nodes are never removed.
    ///
    /// Returns `false` if no such node exists.
    pub fn remove_dispatcher(&self, path: &[String]) -> bool {
        let Some((node, _)) = self.lookup(path) else {
            return false;
        };
        if node.clear_handlers() > 0 {
            self.release(&node);
        }
        node.prune();
        log::debug!("[dispatch] removed dispatcher '{}'", path.join("/"));
        true
    }

    /// Drop every node and handler, keeping only the root, and withdraw all
    /// subscriptions.
    pub fn clear(&self) {
        self.withdraw(&self.root);
        self.root.detach_subtree();
        log::debug!("[dispatch] tree cleared");
    }

    #[must_use]
    pub fn get_dispatcher(&self, path: &[String]) -> Option<Arc<DispatchNode>> {
        self.lookup(path).map(|(node, _)| node)
    }

    /// True iff a handler is registered at or below `path`.
    #[must_use]
    pub fn has_dispatcher(&self, path: &[String]) -> bool {
        self.get_dispatcher(path)
            .is_some_and(|node| node.has_handlers_below())
    }

    /// Register `handler` at `path`, creating plain nodes as needed.
    pub fn add_handler(&self, path: &[String], handler: Arc<dyn TopicHandler>) -> Registration {
        let plain: Arc<dyn SegmentStrategy> = Arc::new(PlainSegments);
        loop {
            let Some(node) = self.ensure(path, &plain) else {
                log::debug!("[dispatch] path '{}' rejected", path.join("/"));
                return Registration::Rejected;
            };
            match node.insert_handler(&handler) {
                Some(Registration::Added) => {
                    self.claim(&node);
                    return Registration::Added;
                }
                Some(outcome) => return outcome,
                None => log::trace!("[dispatch] node detached before insert, retrying"),
            }
        }
    }

    /// Remove one handler (same instance or equivalent) from `path` and prune.
    pub fn remove_handler(&self, path: &[String], handler: &Arc<dyn TopicHandler>) -> bool {
        let Some((node, _)) = self.lookup(path) else {
            return false;
        };
        if !node.remove_handler(handler) {
            return false;
        }
        self.release(&node);
        node.prune();
        true
    }

    /// Remove every handler registered exactly at `path` and prune.
    /// Returns the number of handlers removed.
    pub fn remove_handlers(&self, path: &[String]) -> usize {
        let Some((node, _)) = self.lookup(path) else {
            return 0;
        };
        let removed = node.clear_handlers();
        if removed > 0 {
            self.release(&node);
            node.prune();
        }
        removed
    }

    /// Match `segments[position..]` against the tree and invoke every handler
    /// of the node where the segments run out.
    ///
    /// Returns the number of handlers invoked.
    ///
    /// # Performance
    /// HOT PATH: runs on the transport delivery thread for every message.
    pub fn execute(&self, segments: &[String], position: usize, payload: &[u8]) -> usize {
        let node = loop {
            match self.root.find(segments, position) {
                Walk::Found { node, .. } => break Some(node),
                Walk::Missing => break None,
                Walk::Detached => continue,
            }
        };
        let invoked = match node {
            Some(node) => {
                let (invoked, panics) = node.deliver(segments, payload);
                if panics > 0 {
                    self.metrics
                        .handler_panics
                        .fetch_add(panics as u64, Ordering::Relaxed);
                }
                invoked
            }
            None => 0,
        };
        if invoked == 0 {
            self.metrics.messages_orphaned.fetch_add(1, Ordering::Relaxed);
            log::debug!("[dispatch] no handler for '{}'", segments.join("/"));
        } else {
            self.metrics.messages_dispatched.fetch_add(1, Ordering::Relaxed);
            self.metrics
                .handler_invocations
                .fetch_add(invoked as u64, Ordering::Relaxed);
        }
        invoked
    }

    /// Transport patterns for every handler-bearing subtree of the tree.
    #[must_use]
    pub fn get_all_subscriptions(&self) -> Vec<Vec<String>> {
        self.get_subscriptions(&[])
    }

    /// Transport patterns for the handler-bearing subtrees at or below `path`.
    #[must_use]
    pub fn get_subscriptions(&self, path: &[String]) -> Vec<Vec<String>> {
        let mut patterns = BTreeSet::new();
        if let Some((node, consumed)) = self.lookup(path) {
            let prefixes = if consumed {
                vec![path.to_vec()]
            } else {
                node.strategy().expand(path)
            };
            node.collect_patterns(prefixes, &mut patterns);
        }
        patterns.into_iter().collect()
    }

    /// `node` gained handlers: subscribe its patterns unless an ancestor
    /// already covers it, then withdraw the patterns held below it.
    ///
    /// Only the node's own ancestors and subtree are visited. A node that
    /// already holds its patterns causes no transport call. A failed
    /// subscribe is not recorded and is retried on reconnection.
    fn claim(&self, node: &Arc<DispatchNode>) {
        {
            let mut held = node.subscribed().lock();
            if !held.is_empty()
                || node.is_detached()
                || node.handler_count() == 0
                || node.covered_by_ancestor()
            {
                return;
            }
            for pattern in node.topic_prefixes().into_iter().map(subtree_pattern) {
                match self.transport.subscribe(&pattern) {
                    Ok(()) => {
                        log::debug!("[dispatch] subscribed '{}'", pattern.join("/"));
                        held.push(pattern);
                    }
                    Err(e) => log::warn!("[dispatch] subscribe '{}' failed: {}", pattern.join("/"), e),
                }
            }
        }
        for child in node.children() {
            self.withdraw(&child);
        }
    }

    /// `node` lost its handlers: hand its coverage down to the nearest
    /// handler-bearing descendants, then drop its own patterns.
    fn release(&self, node: &Arc<DispatchNode>) {
        if node.handler_count() > 0 {
            return;
        }
        if !node.covered_by_ancestor() {
            for child in node.children() {
                self.claim_frontier(&child);
            }
        }
        let held = {
            let mut held = node.subscribed().lock();
            if node.handler_count() > 0 {
                return;
            }
            std::mem::take(&mut *held)
        };
        self.unsubscribe_all(held);
    }

    fn claim_frontier(&self, node: &Arc<DispatchNode>) {
        if node.handler_count() > 0 {
            self.claim(node);
        } else {
            for child in node.children() {
                self.claim_frontier(&child);
            }
        }
    }

    /// Drop the patterns held anywhere in `node`'s subtree.
    fn withdraw(&self, node: &Arc<DispatchNode>) {
        let held = std::mem::take(&mut *node.subscribed().lock());
        self.unsubscribe_all(held);
        for child in node.children() {
            self.withdraw(&child);
        }
    }

    fn unsubscribe_all(&self, patterns: Vec<Vec<String>>) {
        for pattern in patterns {
            match self.transport.unsubscribe(&pattern) {
                Ok(()) => log::debug!("[dispatch] unsubscribed '{}'", pattern.join("/")),
                Err(e) => log::warn!("[dispatch] unsubscribe '{}' failed: {}", pattern.join("/"), e),
            }
        }
    }

    /// Re-issue every current subscription, e.g. after a reconnect.
    pub fn resubscribe_all(&self) {
        let mut count = 0;
        self.reissue(&self.root, false, &mut count);
        log::info!("[dispatch] resubscribed {} pattern(s)", count);
    }

    fn reissue(&self, node: &Arc<DispatchNode>, covered: bool, count: &mut usize) {
        let bears = node.handler_count() > 0;
        {
            let mut held = node.subscribed().lock();
            if bears && !covered {
                held.clear();
                for pattern in node.topic_prefixes().into_iter().map(subtree_pattern) {
                    match self.transport.subscribe(&pattern) {
                        Ok(()) => held.push(pattern),
                        Err(e) => log::warn!("[dispatch] resubscribe '{}' failed: {}", pattern.join("/"), e),
                    }
                }
                *count += held.len();
            } else if !held.is_empty() {
                let stale = std::mem::take(&mut *held);
                drop(held);
                self.unsubscribe_all(stale);
            }
        }
        for child in node.children() {
            self.reissue(&child, covered || bears, count);
        }
    }
}

impl MessageSink for RootDispatcher {
    fn on_message(&self, topic: &[String], payload: &[u8]) {
        self.execute(topic, 0, payload);
    }

    fn on_connection_state(&self, connected: bool) {
        if connected {
            self.resubscribe_all();
        } else {
            log::info!("[dispatch] transport disconnected");
        }
    }
}
