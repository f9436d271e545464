//! An in-process [`ClusterTransport`] backed by per-shard mailboxes
//! instead of sockets, so the test suite can deterministically control
//! delivery order — including out-of-order and duplicate-delivery
//! scenarios — without real threads, sleeps, or socket timing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::CoreResult;
use crate::message::{Destination, Message};
use crate::node_id::NodeId;
use crate::transport::ClusterTransport;

struct Mailboxes {
    inboxes: Mutex<HashMap<NodeId, VecDeque<(NodeId, Message)>>>,
    node_ids: Vec<NodeId>,
}

/// A shared in-memory network; one [`MemoryTransport`] handle per shard is
/// obtained via [`MemoryNetwork::transport_for`].
#[derive(Clone)]
pub struct MemoryNetwork(Arc<Mailboxes>);

impl MemoryNetwork {
    pub fn new(node_ids: Vec<NodeId>) -> Self {
        let inboxes = node_ids.iter().map(|id| (*id, VecDeque::new())).collect();
        MemoryNetwork(Arc::new(Mailboxes {
            inboxes: Mutex::new(inboxes),
            node_ids,
        }))
    }

    pub fn transport_for(&self, node: NodeId) -> MemoryTransport {
        MemoryTransport {
            my_id: node,
            network: self.clone(),
        }
    }

    fn enqueue(&self, target: NodeId, sender: NodeId, message: Message) {
        let mut inboxes = self.0.inboxes.lock().expect("mailbox lock poisoned");
        if let Some(queue) = inboxes.get_mut(&target) {
            queue.push_back((sender, message));
        }
    }
}

pub struct MemoryTransport {
    my_id: NodeId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    /// Pops every message queued for this shard, in FIFO arrival order.
    pub fn drain_inbox(&self) -> Vec<(NodeId, Message)> {
        let mut inboxes = self.network.0.inboxes.lock().expect("mailbox lock poisoned");
        inboxes
            .get_mut(&self.my_id)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Pops the oldest queued message, if any — for tests that want to
    /// interleave delivery across shards one message at a time.
    pub fn pop_one(&self) -> Option<(NodeId, Message)> {
        let mut inboxes = self.network.0.inboxes.lock().expect("mailbox lock poisoned");
        inboxes.get_mut(&self.my_id).and_then(|queue| queue.pop_front())
    }

    pub fn is_empty(&self) -> bool {
        let inboxes = self.network.0.inboxes.lock().expect("mailbox lock poisoned");
        inboxes.get(&self.my_id).map_or(true, |queue| queue.is_empty())
    }
}

impl ClusterTransport for MemoryTransport {
    fn my_id(&self) -> NodeId {
        self.my_id
    }

    fn cluster_size(&self) -> usize {
        self.network.0.node_ids.len()
    }

    fn send(&self, destination: Destination, message: Message) -> CoreResult<()> {
        match destination {
            Destination::Peer(node) => self.network.enqueue(node, self.my_id, message),
            Destination::AllIncludingSelf => {
                for node in self.network.0.node_ids.clone() {
                    self.network.enqueue(node, self.my_id, message.clone());
                }
            }
        }
        Ok(())
    }
}
