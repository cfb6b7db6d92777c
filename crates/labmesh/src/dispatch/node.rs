// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch tree node.
//!
//! # Locking
//! Every node has its own mutex; there is no tree-wide lock. Lookups and
//! deliveries hold at most one node lock at a time and never while invoking
//! handlers. Pruning locks parent then child. A pruned node is marked
//! detached under both locks, so a registration racing with the prune sees
//! the mark and restarts from the root instead of landing in an orphaned
//! subtree.
//!
//! Transport patterns a node has subscribed sit behind a second, per-node
//! lock so a slow transport call never blocks lookups through that node.

use super::handler::{same_handler, Registration, TopicHandler};
use super::strategy::{subtree_pattern, PlainSegments, SegmentStrategy};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

struct NodeInner {
    children: HashMap<String, Arc<DispatchNode>>,
    handlers: Vec<Arc<dyn TopicHandler>>,
    detached: bool,
}

/// Node of the dispatch tree.
pub struct DispatchNode {
    key: String,
    strategy: Arc<dyn SegmentStrategy>,
    parent: Weak<DispatchNode>,
    inner: Mutex<NodeInner>,
    /// Patterns subscribed at the transport on behalf of this node.
    subscribed: Mutex<Vec<Vec<String>>>,
}

/// Result of walking the tree towards a path.
pub(crate) enum Walk {
    /// `consumed` is false when the path ended on the node's key, before the
    /// node's strategy consumed anything.
    Found {
        node: Arc<DispatchNode>,
        consumed: bool,
    },
    Missing,
    /// The walk hit a node that was pruned concurrently; restart from the root.
    Detached,
}

impl DispatchNode {
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self {
            key: String::new(),
            strategy: Arc::new(PlainSegments),
            parent: Weak::new(),
            inner: Mutex::new(NodeInner {
                children: HashMap::new(),
                handlers: Vec::new(),
                detached: false,
            }),
            subscribed: Mutex::new(Vec::new()),
        })
    }

    fn child_of(parent: &Arc<Self>, key: &str, strategy: Arc<dyn SegmentStrategy>) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            strategy,
            parent: Arc::downgrade(parent),
            inner: Mutex::new(NodeInner {
                children: HashMap::new(),
                handlers: Vec::new(),
                detached: false,
            }),
            subscribed: Mutex::new(Vec::new()),
        })
    }

    /// Segment selecting this node from its parent (empty for the root).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn strategy(&self) -> &Arc<dyn SegmentStrategy> {
        &self.strategy
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.inner.lock().children.len()
    }

    pub(crate) fn parent(&self) -> Option<Arc<DispatchNode>> {
        self.parent.upgrade()
    }

    /// Children ordered by key.
    pub(crate) fn children(&self) -> Vec<Arc<DispatchNode>> {
        let mut children: Vec<Arc<DispatchNode>> = self.inner.lock().children.values().cloned().collect();
        children.sort_by(|a, b| a.key.cmp(&b.key));
        children
    }

    pub(crate) fn subscribed(&self) -> &Mutex<Vec<Vec<String>>> {
        &self.subscribed
    }

    /// True if some ancestor carries handlers, so its subtree pattern
    /// already covers this node.
    pub(crate) fn covered_by_ancestor(&self) -> bool {
        let mut current = self.parent.upgrade();
        while let Some(node) = current {
            if !node.inner.lock().handlers.is_empty() {
                return true;
            }
            current = node.parent.upgrade();
        }
        false
    }

    /// Concrete topic prefixes this node stands for, expanded through the
    /// strategies of every node on the way down from the root.
    pub(crate) fn topic_prefixes(self: &Arc<Self>) -> Vec<Vec<String>> {
        let mut chain = vec![Arc::clone(self)];
        while let Some(parent) = chain.last().and_then(|node| node.parent.upgrade()) {
            chain.push(parent);
        }
        chain.reverse();

        let mut prefixes = vec![Vec::new()];
        for node in chain.iter().skip(1) {
            prefixes = prefixes
                .iter()
                .flat_map(|prefix| {
                    let mut keyed = prefix.clone();
                    keyed.push(node.key.clone());
                    node.strategy.expand(&keyed)
                })
                .collect();
        }
        prefixes
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.inner.lock().detached
    }

    /// True if a handler is registered at this node or anywhere below it.
    #[must_use]
    pub fn has_handlers_below(&self) -> bool {
        let children: Vec<Arc<DispatchNode>> = {
            let inner = self.inner.lock();
            if !inner.handlers.is_empty() {
                return true;
            }
            inner.children.values().cloned().collect()
        };
        children.iter().any(|child| child.has_handlers_below())
    }

    /// Walk from this node towards `segments[pos..]` without creating anything.
    pub(crate) fn find(self: &Arc<Self>, segments: &[String], mut pos: usize) -> Walk {
        let mut node = Arc::clone(self);
        loop {
            if pos == segments.len() {
                return Walk::Found {
                    node,
                    consumed: false,
                };
            }
            pos = match node.strategy.consume(segments, pos) {
                Some(next) => next,
                None => return Walk::Missing,
            };
            if pos == segments.len() {
                return Walk::Found {
                    node,
                    consumed: true,
                };
            }
            let next = {
                let inner = node.inner.lock();
                if inner.detached {
                    return Walk::Detached;
                }
                inner.children.get(&segments[pos]).cloned()
            };
            match next {
                Some(child) => {
                    node = child;
                    pos += 1;
                }
                None => return Walk::Missing,
            }
        }
    }

    /// Walk towards `segments[pos..]`, creating missing nodes.
    ///
    /// Intermediate nodes are plain; the node created for the last segment
    /// gets `strategy`. Existing nodes are reused unchanged.
    pub(crate) fn ensure(
        self: &Arc<Self>,
        segments: &[String],
        mut pos: usize,
        strategy: &Arc<dyn SegmentStrategy>,
    ) -> Walk {
        let mut node = Arc::clone(self);
        loop {
            if pos == segments.len() {
                return Walk::Found {
                    node,
                    consumed: false,
                };
            }
            pos = match node.strategy.consume(segments, pos) {
                Some(next) => next,
                None => return Walk::Missing,
            };
            if pos == segments.len() {
                return Walk::Found {
                    node,
                    consumed: true,
                };
            }
            let key = &segments[pos];
            let next = {
                let mut inner = node.inner.lock();
                if inner.detached {
                    return Walk::Detached;
                }
                if let Some(child) = inner.children.get(key).cloned() {
                    child
                } else {
                    let child_strategy = if pos + 1 == segments.len() {
                        Arc::clone(strategy)
                    } else {
                        Arc::new(PlainSegments) as Arc<dyn SegmentStrategy>
                    };
                    let child = Self::child_of(&node, key, child_strategy);
                    inner.children.insert(key.clone(), Arc::clone(&child));
                    log::debug!("[dispatch] created node '{}'", segments[..=pos].join("/"));
                    child
                }
            };
            node = next;
            pos += 1;
        }
    }

    /// Install a handler unless the same or an equivalent one is present.
    ///
    /// Returns `None` if this node was detached in the meantime.
    pub(crate) fn insert_handler(&self, handler: &Arc<dyn TopicHandler>) -> Option<Registration> {
        let mut inner = self.inner.lock();
        if inner.detached {
            return None;
        }
        if inner.handlers.iter().any(|existing| same_handler(existing, handler)) {
            return Some(Registration::AlreadyPresent);
        }
        inner.handlers.push(Arc::clone(handler));
        Some(Registration::Added)
    }

    pub(crate) fn remove_handler(&self, handler: &Arc<dyn TopicHandler>) -> bool {
        let mut inner = self.inner.lock();
        match inner
            .handlers
            .iter()
            .position(|existing| same_handler(existing, handler))
        {
            Some(index) => {
                inner.handlers.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_handlers(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.handlers.len();
        inner.handlers.clear();
        count
    }

    /// Invoke every handler registered here.
    ///
    /// Returns (handlers invoked, handlers that panicked).
    pub(crate) fn deliver(&self, topic: &[String], payload: &[u8]) -> (usize, usize) {
        let handlers: Vec<Arc<dyn TopicHandler>> = self.inner.lock().handlers.clone();
        let mut panics = 0;
        for handler in &handlers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler.handle(topic, payload);
            }));
            if result.is_err() {
                panics += 1;
                log::warn!("[dispatch] handler panicked on '{}'", topic.join("/"));
            }
        }
        (handlers.len(), panics)
    }

    /// Remove this node and its whole subtree from the tree.
    ///
    /// The root cannot be detached; for the root only the content is cleared.
    pub(crate) fn detach_subtree(self: &Arc<Self>) {
        let taken: Vec<Arc<DispatchNode>> = match self.parent.upgrade() {
            Some(parent) => {
                let mut parent_inner = parent.inner.lock();
                let mut inner = self.inner.lock();
                if parent_inner
                    .children
                    .get(&self.key)
                    .is_some_and(|child| Arc::ptr_eq(child, self))
                {
                    parent_inner.children.remove(&self.key);
                }
                inner.detached = true;
                inner.handlers.clear();
                let taken = inner.children.drain().map(|(_, child)| child).collect();
                taken
            }
            None => {
                let mut inner = self.inner.lock();
                inner.handlers.clear();
                let taken = inner.children.drain().map(|(_, child)| child).collect();
                taken
            }
        };
        for child in taken {
            child.mark_detached();
        }
    }

    fn mark_detached(&self) {
        let taken: Vec<Arc<DispatchNode>> = {
            let mut inner = self.inner.lock();
            inner.detached = true;
            inner.handlers.clear();
            let taken = inner.children.drain().map(|(_, child)| child).collect();
            taken
        };
        for child in taken {
            child.mark_detached();
        }
    }

    /// Remove this node if it is empty, then repeat for each ancestor.
    ///
    /// Returns the number of nodes removed.
    pub(crate) fn prune(self: &Arc<Self>) -> usize {
        let mut removed = 0;
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent.upgrade() {
            if !parent.remove_child_if_empty(&current) {
                break;
            }
            removed += 1;
            current = parent;
        }
        removed
    }

    fn remove_child_if_empty(&self, child: &Arc<DispatchNode>) -> bool {
        if child.strategy.persistent() {
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.detached {
            return false;
        }
        let mut child_inner = child.inner.lock();
        if child_inner.detached || !child_inner.handlers.is_empty() || !child_inner.children.is_empty() {
            return false;
        }
        if !inner
            .children
            .get(&child.key)
            .is_some_and(|existing| Arc::ptr_eq(existing, child))
        {
            return false;
        }
        inner.children.remove(&child.key);
        child_inner.detached = true;
        log::debug!("[dispatch] pruned node '{}'", child.key);
        true
    }

    /// Collect subscription patterns for the handler-bearing subtrees at or
    /// below this node. `prefixes` are the concrete topic prefixes this node
    /// stands for, after its own strategy has been applied.
    pub(crate) fn collect_patterns(&self, prefixes: Vec<Vec<String>>, out: &mut BTreeSet<Vec<String>>) {
        let (has_handlers, children) = {
            let inner = self.inner.lock();
            (
                !inner.handlers.is_empty(),
                inner.children.values().cloned().collect::<Vec<_>>(),
            )
        };
        if has_handlers {
            out.extend(prefixes.into_iter().map(subtree_pattern));
            return;
        }
        for child in children {
            let mut child_prefixes = Vec::new();
            for prefix in &prefixes {
                let mut keyed = prefix.clone();
                keyed.push(child.key.clone());
                child_prefixes.extend(child.strategy.expand(&keyed));
            }
            child.collect_patterns(child_prefixes, out);
        }
    }
}

impl fmt::Debug for DispatchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DispatchNode")
            .field("key", &self.key)
            .field("strategy", &self.strategy)
            .field("handlers", &inner.handlers.len())
            .field("children", &inner.children.keys().collect::<Vec<_>>())
            .field("detached", &inner.detached)
            .finish()
    }
}
