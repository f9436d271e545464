//! A co-resident multi-instance Paxos replicated log, a thin replicated
//! data-type framing layer, and a replicated registration map built on
//! top of it.

#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod control;
pub mod error;
pub mod log;
pub mod message;
pub mod node_id;
pub mod paxos;
pub mod registration_map;
pub mod replicated_type;
pub mod runtime;
pub mod transport;

pub use error::{CoreError, CoreResult};
pub use node_id::{LogName, NodeId, ProposalNumber, SlotId};
