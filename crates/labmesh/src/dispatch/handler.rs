// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic handler trait and closure wrapper.

use std::any::Any;
use std::sync::Arc;

/// Receiver of raw inbound messages at one dispatch node.
///
/// # Thread Safety
/// `handle` runs on the transport delivery thread. Implementations must only
/// enqueue work; decoding and user code belong on the executor.
///
/// # Panics
/// A panicking handler is caught by the dispatch node and does not prevent
/// delivery to the other handlers.
pub trait TopicHandler: Send + Sync + 'static {
    /// Called with the full inbound topic and the raw payload bytes.
    fn handle(&self, topic: &[String], payload: &[u8]);

    /// Value equality with another handler, used to reject duplicate
    /// registrations of distinct but equivalent handler instances.
    /// The default only treats the very same instance as a duplicate.
    fn equivalent(&self, _other: &dyn TopicHandler) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// Same instance, or an equivalent one.
pub(crate) fn same_handler(a: &Arc<dyn TopicHandler>, b: &Arc<dyn TopicHandler>) -> bool {
    let a_ptr = Arc::as_ptr(a) as *const () as usize;
    let b_ptr = Arc::as_ptr(b) as *const () as usize;
    a_ptr == b_ptr || a.equivalent(b.as_ref())
}

/// Outcome of a handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Handler installed.
    Added,
    /// The same (or an equivalent) handler was already installed; nothing changed.
    AlreadyPresent,
    /// The path is not accepted by the tree (for example a request path
    /// addressed to another client).
    Rejected,
}

impl Registration {
    #[must_use]
    pub fn is_added(self) -> bool {
        self == Self::Added
    }
}

/// Closure-based [`TopicHandler`].
///
/// # Examples
/// ```
/// use labmesh::dispatch::{FnHandler, TopicHandler};
/// use std::sync::Arc;
///
/// let handler: Arc<dyn TopicHandler> = Arc::new(FnHandler::new(|topic, payload| {
///     println!("{} bytes on {}", payload.len(), topic.join("/"));
/// }));
/// ```
pub struct FnHandler<F>
where
    F: Fn(&[String], &[u8]) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&[String], &[u8]) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> TopicHandler for FnHandler<F>
where
    F: Fn(&[String], &[u8]) + Send + Sync + 'static,
{
    fn handle(&self, topic: &[String], payload: &[u8]) {
        (self.callback)(topic, payload);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagged(u32);

    impl TopicHandler for Tagged {
        fn handle(&self, _topic: &[String], _payload: &[u8]) {}

        fn equivalent(&self, other: &dyn TopicHandler) -> bool {
            other
                .as_any()
                .downcast_ref::<Tagged>()
                .is_some_and(|other| other.0 == self.0)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_same_handler_identity_and_equivalence() {
        let a: Arc<dyn TopicHandler> = Arc::new(Tagged(1));
        let b: Arc<dyn TopicHandler> = Arc::new(Tagged(1));
        let c: Arc<dyn TopicHandler> = Arc::new(Tagged(2));
        let f: Arc<dyn TopicHandler> = Arc::new(FnHandler::new(|_, _| {}));
        let g: Arc<dyn TopicHandler> = Arc::new(FnHandler::new(|_, _| {}));

        assert!(same_handler(&a, &Arc::clone(&a)));
        assert!(same_handler(&a, &b));
        assert!(!same_handler(&a, &c));
        assert!(same_handler(&f, &Arc::clone(&f)));
        assert!(!same_handler(&f, &g));
    }
}
