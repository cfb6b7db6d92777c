// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hierarchical topic names and address construction.
//!
//! Every routed topic has the shape
//!
//! ```text
//! prefix..., applicationId, kind (msg|req|rep), groupId, clientId, subject...
//! ```
//!
//! RPC replies append the correlation id as one final segment.
//!
//! Two kinds of reserved tokens exist:
//! - transport wildcards [`ONE_LEVEL`] and [`ALL_LEVELS`], only ever used in
//!   subscription patterns handed to the transport;
//! - the RPC-only [`ANY`] token, which may appear as a whole group or client
//!   segment of a request address and means "any concrete value".

use crate::error::{LabmeshError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport wildcard matching exactly one level.
pub const ONE_LEVEL: &str = "+";
/// Transport wildcard matching all remaining levels (including none).
pub const ALL_LEVELS: &str = "#";
/// RPC "any" token: matches any concrete group or client value.
pub const ANY: &str = "*";

const SEPARATOR: char = '/';
const RESERVED_CHARS: [char; 4] = ['/', '+', '#', '*'];

fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(LabmeshError::InvalidSegment {
            segment: String::new(),
            reason: "segment is empty",
        });
    }
    if segment.contains(RESERVED_CHARS) {
        return Err(LabmeshError::InvalidSegment {
            segment: segment.to_string(),
            reason: "segment contains a reserved character",
        });
    }
    Ok(())
}

/// Group or client segment of a destination: a concrete value or [`ANY`].
fn check_address_part(segment: &str) -> Result<()> {
    if segment == ANY {
        Ok(())
    } else {
        check_segment(segment)
    }
}

/// Ordered, non-empty list of topic segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(Vec<String>);

impl Topic {
    /// Build a topic from application-chosen segments, validating each one.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(LabmeshError::EmptyTopic);
        }
        for segment in &segments {
            check_segment(segment)?;
        }
        Ok(Self(segments))
    }

    /// Parse a `/`-separated topic string.
    pub fn parse(text: &str) -> Result<Self> {
        Self::new(text.split(SEPARATOR))
    }

    /// Wrap segments that were already produced by the address builder or
    /// received from the transport. No validation is performed.
    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    #[must_use]
    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Topic with one more validated segment appended.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self> {
        let segment = segment.into();
        check_segment(&segment)?;
        let mut segments = self.0.clone();
        segments.push(segment);
        Ok(Self(segments))
    }

    #[must_use]
    pub fn into_segments(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl TryFrom<&str> for Topic {
    type Error = LabmeshError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl AsRef<[String]> for Topic {
    fn as_ref(&self) -> &[String] {
        &self.0
    }
}

/// Kind of transmission, encoded as one topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionKind {
    /// One-way notification.
    Msg,
    /// RPC request.
    Req,
    /// RPC reply.
    Rep,
}

impl TransmissionKind {
    #[must_use]
    pub fn as_segment(self) -> &'static str {
        match self {
            Self::Msg => "msg",
            Self::Req => "req",
            Self::Rep => "rep",
        }
    }
}

impl fmt::Display for TransmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_segment())
    }
}

/// Concrete (group, client) identity of one client process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub group: String,
    pub client: String,
}

impl Identity {
    pub fn new(group: impl Into<String>, client: impl Into<String>) -> Result<Self> {
        let identity = Self {
            group: group.into(),
            client: client.into(),
        };
        check_segment(&identity.group)?;
        check_segment(&identity.client)?;
        Ok(identity)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.client)
    }
}

/// Request destination: one client, every client of a group, or everyone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    group: String,
    client: String,
}

impl Destination {
    /// One concrete client.
    pub fn client(group: impl Into<String>, client: impl Into<String>) -> Result<Self> {
        Self::new(group, client)
    }

    /// Every client of a concrete group.
    pub fn group(group: impl Into<String>) -> Result<Self> {
        Self::new(group, ANY)
    }

    /// Every client of every group.
    #[must_use]
    pub fn all() -> Self {
        Self {
            group: ANY.to_string(),
            client: ANY.to_string(),
        }
    }

    /// Build from raw parts. The client may be [`ANY`]; the group only when
    /// the client is [`ANY`] as well, since no request node listens on
    /// (any group, concrete client).
    pub fn new(group: impl Into<String>, client: impl Into<String>) -> Result<Self> {
        let destination = Self {
            group: group.into(),
            client: client.into(),
        };
        check_address_part(&destination.group)?;
        check_address_part(&destination.client)?;
        if destination.group == ANY && destination.client != ANY {
            return Err(LabmeshError::InvalidSegment {
                segment: destination.client,
                reason: "a concrete client needs a concrete group",
            });
        }
        Ok(destination)
    }

    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client
    }

    /// True when the destination may reach more than one client.
    #[must_use]
    pub fn is_fan_out(&self) -> bool {
        self.group == ANY || self.client == ANY
    }
}

impl From<&Identity> for Destination {
    fn from(identity: &Identity) -> Self {
        Self {
            group: identity.group.clone(),
            client: identity.client.clone(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.client)
    }
}

/// Builds full topic addresses from a routing prefix and application id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBuilder {
    prefix: Vec<String>,
    application_id: String,
}

impl AddressBuilder {
    pub fn new<I, S>(prefix: I, application_id: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix: Vec<String> = prefix.into_iter().map(Into::into).collect();
        for segment in &prefix {
            check_segment(segment)?;
        }
        let application_id = application_id.into();
        check_segment(&application_id)?;
        Ok(Self {
            prefix,
            application_id,
        })
    }

    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// `prefix..., applicationId, kind`: the path of the per-kind node.
    #[must_use]
    pub fn base(&self, kind: TransmissionKind) -> Vec<String> {
        let mut segments = Vec::with_capacity(self.prefix.len() + 2);
        segments.extend(self.prefix.iter().cloned());
        segments.push(self.application_id.clone());
        segments.push(kind.as_segment().to_string());
        segments
    }

    fn addressed(&self, kind: TransmissionKind, group: &str, client: &str, subject: &Topic) -> Topic {
        let mut segments = self.base(kind);
        segments.reserve(subject.len() + 2);
        segments.push(group.to_string());
        segments.push(client.to_string());
        segments.extend(subject.segments().iter().cloned());
        Topic::from_segments(segments)
    }

    /// Notification address: the publisher's own identity plus subject.
    #[must_use]
    pub fn message(&self, source: &Identity, subject: &Topic) -> Topic {
        self.addressed(TransmissionKind::Msg, &source.group, &source.client, subject)
    }

    /// Request address for a (possibly fan-out) destination.
    #[must_use]
    pub fn request(&self, destination: &Destination, subject: &Topic) -> Topic {
        self.addressed(
            TransmissionKind::Req,
            &destination.group,
            &destination.client,
            subject,
        )
    }

    /// Reply subtree of `requester` for `subject`, without a correlation id.
    #[must_use]
    pub fn reply_base(&self, requester: &Identity, subject: &Topic) -> Topic {
        self.addressed(
            TransmissionKind::Rep,
            &requester.group,
            &requester.client,
            subject,
        )
    }

    /// Full reply address: reply subtree plus the correlation id segment.
    #[must_use]
    pub fn reply(&self, requester: &Identity, subject: &Topic, correlation_id: &str) -> Topic {
        let mut segments = self.reply_base(requester, subject).into_segments();
        segments.push(correlation_id.to_string());
        Topic::from_segments(segments)
    }
}

/// Transport-side wildcard matching of a concrete topic against a pattern.
///
/// `+` matches exactly one level, `#` matches all remaining levels including
/// none (so `a/#` matches `a`).
#[must_use]
pub fn pattern_matches(pattern: &[String], topic: &[String]) -> bool {
    let mut index = 0;
    for part in pattern {
        if part == ALL_LEVELS {
            return true;
        }
        match topic.get(index) {
            Some(segment) if part == ONE_LEVEL || part == segment => index += 1,
            _ => return false,
        }
    }
    index == topic.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(text: &str) -> Vec<String> {
        text.split('/').map(str::to_string).collect()
    }

    #[test]
    fn test_topic_rejects_reserved_and_empty_segments() {
        assert!(Topic::parse("sensors/temperature").is_ok());
        assert!(matches!(Topic::parse("a//b"), Err(LabmeshError::InvalidSegment { .. })));
        assert!(Topic::parse("a/+/b").is_err());
        assert!(Topic::parse("a/#").is_err());
        assert!(Topic::parse("a/*").is_err());
        assert!(matches!(
            Topic::new(Vec::<String>::new()),
            Err(LabmeshError::EmptyTopic)
        ));
    }

    #[test]
    fn test_destination_accepts_any_only_as_whole_part() {
        assert!(Destination::group("sim").is_ok());
        assert!(Destination::new("*", "*").is_ok());
        assert!(Destination::new("sim*", "a").is_err());
        assert!(Destination::all().is_fan_out());
    }

    #[test]
    fn test_destination_rejects_any_group_with_concrete_client() {
        assert!(matches!(
            Destination::new("*", "motor"),
            Err(LabmeshError::InvalidSegment { ref segment, .. }) if segment == "motor"
        ));
        assert!(Destination::client("*", "motor").is_err());
        assert!(Destination::new("plant", "*").is_ok());
        assert!(!Destination::client("sim", "a").expect("valid").is_fan_out());
    }

    #[test]
    fn test_address_shapes() {
        let builder = AddressBuilder::new(["lab"], "cosim").expect("builder");
        let me = Identity::new("plant", "motor").expect("identity");
        let subject = Topic::parse("ping").expect("subject");

        assert_eq!(
            builder.message(&me, &subject).to_string(),
            "lab/cosim/msg/plant/motor/ping"
        );
        assert_eq!(
            builder.request(&Destination::group("ctrl").expect("dest"), &subject).to_string(),
            "lab/cosim/req/ctrl/*/ping"
        );
        assert_eq!(
            builder.reply(&me, &subject, "abc123").to_string(),
            "lab/cosim/rep/plant/motor/ping/abc123"
        );
        assert_eq!(builder.base(TransmissionKind::Req), segs("lab/cosim/req"));
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches(&segs("a/b/#"), &segs("a/b/c/d")));
        assert!(pattern_matches(&segs("a/b/#"), &segs("a/b")));
        assert!(pattern_matches(&segs("a/+/c"), &segs("a/x/c")));
        assert!(!pattern_matches(&segs("a/+/c"), &segs("a/x/y/c")));
        assert!(!pattern_matches(&segs("a/b"), &segs("a/b/c")));
        assert!(pattern_matches(&segs("#"), &segs("anything/at/all")));
        // The RPC any token is a literal for the transport.
        assert!(!pattern_matches(&segs("a/*/c"), &segs("a/x/c")));
        assert!(pattern_matches(&segs("a/*/c"), &segs("a/*/c")));
    }
}
