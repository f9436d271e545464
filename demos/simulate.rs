//! In-process simulation of a 3-shard cluster over [`MemoryTransport`]: a
//! single binary that drives co-resident shards by hand, no sockets, no
//! threads, playing out a symmetric proposal race end to end.

use paxos_core::log::Log;
use paxos_core::node_id::{LogName, NodeId};
use paxos_core::transport::memory::{MemoryNetwork, MemoryTransport};
use paxos_core::transport::ClusterTransport;

fn shard_id(seed: u8) -> NodeId {
    let mut bytes = [0u8; 16];
    bytes[15] = seed;
    NodeId::from_bytes(bytes)
}

fn main() {
    env_logger::init();

    let ids: Vec<NodeId> = (0..3).map(shard_id).collect();
    let network = MemoryNetwork::new(ids.clone());

    let transports: Vec<MemoryTransport> = ids.iter().map(|id| network.transport_for(*id)).collect();
    let mut logs: Vec<Log<()>> = ids.iter().map(|id| Log::new(LogName::new("demo"), *id)).collect();

    let slot_a = logs[0].send(&transports[0], b"a", None).expect("X proposes");
    let slot_b = logs[1].send(&transports[1], b"b", None).expect("Y proposes");
    println!("X attempted slot {}, Y attempted slot {} (may race onto the same slot)", slot_a, slot_b);

    loop {
        let mut progressed = false;
        for i in 0..ids.len() {
            while let Some((sender, message)) = transports[i].pop_one() {
                progressed = true;
                let delivered = logs[i]
                    .on_receive(&transports[i], sender, message)
                    .expect("on_receive never fails against MemoryTransport");
                for entry in delivered {
                    println!(
                        "shard {} delivered slot {}: {:?}",
                        ids[i],
                        entry.slot,
                        String::from_utf8_lossy(&entry.payload)
                    );
                }
            }
        }
        if !progressed {
            break;
        }
    }
}
