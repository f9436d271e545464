//! Identifiers used throughout the core: [`NodeId`], [`LogName`],
//! [`SlotId`] and [`ProposalNumber`].

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fixed-width opaque identifier for a shard. Equality is bytewise;
/// stable for the lifetime of a cluster view.
///
/// Backed by a [`Uuid`] for a convenient, already-fixed-width 16-byte
/// identifier with a cheap `Copy`/`Eq` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new_random() -> Self {
        NodeId(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        NodeId(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A short UTF-8 string naming a replicated log globally.
/// Used as the routing key to look a log up on each shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogName(String);

impl LogName {
    pub fn new(name: impl Into<String>) -> Self {
        LogName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LogName {
    fn from(s: &str) -> Self {
        LogName::new(s)
    }
}

/// Monotonically increasing non-negative integer, local to a log name.
pub type SlotId = u64;

/// Non-negative integer, monotone per (log, slot, role).
pub type ProposalNumber = u64;
