//! The eight Paxos message kinds and the opaque [`Value`] they
//! carry.
//!
//! Seven of the eight kinds cross the wire and are the variants of
//! [`Message`] below (`Recruit` through `Learn`). The eighth,
//! `StartInstance`, never does — it carries a caller-owned generic handle
//! that must never be serialized, so it cannot be a `Message` variant at
//! all. It is instead realized directly as [`crate::log::Log::send`]
//! (invoked once locally, not dispatched from a received enum), which runs
//! exactly the same create-instance-then-broadcast-`Recruit` sequence the
//! C source's `Consensus_StartInstance` ran via a self-addressed pointer
//! message.

use serde::{Deserialize, Serialize};

use crate::node_id::{LogName, NodeId, ProposalNumber, SlotId};

/// An opaque byte sequence supplied by the caller, carrying the proposing
/// shard's [`NodeId`] as a prefix once it has been handed to [`crate::log`].
/// The prefix makes two shards' otherwise-identical proposals distinct
/// Paxos values, which both the learner's majority tally and the "did my
/// value win" check rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value(pub Vec<u8>);

impl Value {
    /// Prefixes `payload` with `origin`'s bytes, as `log::send` does before
    /// proposing.
    pub fn with_origin_prefix(origin: NodeId, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(16 + payload.len());
        bytes.extend_from_slice(origin.as_bytes());
        bytes.extend_from_slice(payload);
        Value(bytes)
    }

    /// Splits a prefixed value back into the originating [`NodeId`] and the
    /// caller's original bytes. Panics if `self` is shorter than a NodeId,
    /// which cannot happen for any value this crate itself produced.
    pub fn split_origin(&self) -> (NodeId, &[u8]) {
        let (prefix, rest) = self.0.split_at(16);
        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(prefix);
        (NodeId::from_bytes(id_bytes), rest)
    }

    /// The payload with the origin prefix stripped, as delivered to
    /// `on_decided`.
    pub fn without_origin_prefix(&self) -> Vec<u8> {
        self.split_origin().1.to_vec()
    }

    pub fn origin(&self) -> NodeId {
        self.split_origin().0
    }
}

/// The seven on-wire Paxos message kinds, each carrying
/// `(LogName, SlotId, ProposalNumber, ..)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Phase 1a: "promise me not to accept anything numbered < proposal".
    Recruit {
        log: LogName,
        slot: SlotId,
        proposal: ProposalNumber,
    },
    /// Phase 1b positive: promise granted, with whatever this acceptor
    /// had previously accepted, if anything.
    Recruited {
        log: LogName,
        slot: SlotId,
        proposal: ProposalNumber,
        prior_proposal: ProposalNumber,
        prior_value: Option<Value>,
    },
    /// Phase 1b negative: "I have already promised `seen >= proposal`".
    Denied {
        log: LogName,
        slot: SlotId,
        seen: ProposalNumber,
    },
    /// Phase 2a: "please accept `value` at `proposal`".
    Accept {
        log: LogName,
        slot: SlotId,
        proposal: ProposalNumber,
        value: Value,
    },
    /// Phase 2b positive.
    Accepted {
        log: LogName,
        slot: SlotId,
        proposal: ProposalNumber,
    },
    /// Phase 2b negative.
    AcceptDenied {
        log: LogName,
        slot: SlotId,
        seen: ProposalNumber,
    },
    /// Broadcast of the value an acceptor just accepted, to every learner
    /// (including the acceptor's own shard).
    Learn {
        log: LogName,
        slot: SlotId,
        proposal: ProposalNumber,
        value: Value,
    },
}

impl Message {
    pub fn log_name(&self) -> &LogName {
        match self {
            Message::Recruit { log, .. }
            | Message::Recruited { log, .. }
            | Message::Denied { log, .. }
            | Message::Accept { log, .. }
            | Message::Accepted { log, .. }
            | Message::AcceptDenied { log, .. }
            | Message::Learn { log, .. } => log,
        }
    }

    pub fn slot(&self) -> SlotId {
        match self {
            Message::Recruit { slot, .. }
            | Message::Recruited { slot, .. }
            | Message::Denied { slot, .. }
            | Message::Accept { slot, .. }
            | Message::Accepted { slot, .. }
            | Message::AcceptDenied { slot, .. }
            | Message::Learn { slot, .. } => *slot,
        }
    }

    /// Human-readable kind tag for log lines, for tracing messages at
    /// `info!` level without dumping the full payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Recruit { .. } => "Recruit",
            Message::Recruited { .. } => "Recruited",
            Message::Denied { .. } => "Denied",
            Message::Accept { .. } => "Accept",
            Message::Accepted { .. } => "Accepted",
            Message::AcceptDenied { .. } => "AcceptDenied",
            Message::Learn { .. } => "Learn",
        }
    }
}

/// Where a message should be delivered: a single peer, or every shard
/// including the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Peer(NodeId),
    AllIncludingSelf,
}
