//! Shared harness for the scenario tests: a small in-process cluster over
//! [`MemoryTransport`], driven by hand one message at a time.

use paxos_core::log::{Delivered, Log};
use paxos_core::node_id::{LogName, NodeId, SlotId};
use paxos_core::transport::memory::{MemoryNetwork, MemoryTransport};
use paxos_core::transport::ClusterTransport;

pub fn shard_id(seed: u8) -> NodeId {
    let mut bytes = [0u8; 16];
    bytes[15] = seed;
    NodeId::from_bytes(bytes)
}

pub struct Cluster<H> {
    pub ids: Vec<NodeId>,
    pub transports: Vec<MemoryTransport>,
    pub logs: Vec<Log<H>>,
}

impl<H> Cluster<H> {
    pub fn new(shard_count: usize) -> Self {
        let ids: Vec<NodeId> = (0..shard_count as u8).map(shard_id).collect();
        let network = MemoryNetwork::new(ids.clone());
        let transports = ids.iter().map(|id| network.transport_for(*id)).collect();
        let logs = ids.iter().map(|id| Log::new(LogName::new("demo"), *id)).collect();
        Cluster { ids, transports, logs }
    }

    pub fn send(&mut self, shard: usize, payload: &[u8], additional_data: Option<H>) -> SlotId {
        self.logs[shard]
            .send(&self.transports[shard], payload, additional_data)
            .expect("send against MemoryTransport never fails")
    }

    /// Round-robins over every shard's inbox until none has anything left
    /// to process, collecting every delivery as `(shard_index, Delivered)`
    /// in the order it happened.
    pub fn run_to_quiescence(&mut self) -> Vec<(usize, Delivered<H>)> {
        let mut all = Vec::new();
        loop {
            let mut progressed = false;
            for i in 0..self.ids.len() {
                while let Some((sender, message)) = self.transports[i].pop_one() {
                    progressed = true;
                    let delivered = self.logs[i]
                        .on_receive(&self.transports[i], sender, message)
                        .expect("on_receive against MemoryTransport never fails");
                    for d in delivered {
                        all.push((i, d));
                    }
                }
            }
            if !progressed {
                break;
            }
        }
        all
    }
}
