//! Errors surfaced at the core's I/O and decode boundaries.
//!
//! The Paxos protocol's own "failures" (a denied proposal, a stale reply, an
//! unknown slot) are never surfaced here — they are internal state
//! transitions handled entirely within `paxos::instance` and `log`. Only
//! transport I/O, wire decoding and unknown-name lookups produce a
//! `Result`, so a host service can inspect and log the failure instead of
//! unwinding.

use thiserror::Error;

use crate::node_id::LogName;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no log registered under the name {0:?}")]
    UnknownLog(LogName),

    #[error("no operation {0:?} registered on this replicated type")]
    UnknownOp(String),

    #[error("failed to decode a wire message: {0}")]
    Decode(#[from] bincode::Error),

    #[error("cluster transport I/O error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("no peer address configured for node {0:?}")]
    UnknownPeer(crate::node_id::NodeId),

    #[error("malformed op frame: {0}")]
    MalformedOpFrame(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;
