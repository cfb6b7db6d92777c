// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC value types.

use std::fmt;
use std::num::NonZeroUsize;

/// Length of a correlation id in characters.
pub const CORRELATION_ID_LEN: usize = 12;

/// Short unique token tying replies to their request.
///
/// Taken from a random (v4) UUID, so it is a valid topic segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(String);

impl CorrelationId {
    #[must_use]
    pub fn generate() -> Self {
        let mut text = uuid::Uuid::new_v4().simple().to_string();
        text.truncate(CORRELATION_ID_LEN);
        Self(text)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Number of replies a request waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCount {
    Exactly(NonZeroUsize),
    /// Collect every reply until the timeout, which then ends the call
    /// without error.
    Unlimited,
}

impl ReplyCount {
    /// A single reply.
    pub const ONE: Self = Self::Exactly(NonZeroUsize::MIN);

    #[must_use]
    pub fn exactly(count: usize) -> Option<Self> {
        NonZeroUsize::new(count).map(Self::Exactly)
    }

    /// Wire-style count: any value below 1 means unlimited.
    #[must_use]
    pub fn from_signed(count: i64) -> Self {
        match usize::try_from(count).ok().and_then(NonZeroUsize::new) {
            Some(count) => Self::Exactly(count),
            None => Self::Unlimited,
        }
    }

    #[must_use]
    pub fn finite(self) -> Option<usize> {
        match self {
            Self::Exactly(count) => Some(count.get()),
            Self::Unlimited => None,
        }
    }
}

impl fmt::Display for ReplyCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(count) => write!(f, "{}", count),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}
