//! The cluster transport collaborator. The core only requires three
//! operations from the host — `my_id`, `cluster_size`, `send` — and in
//! turn drives the host's `on_receive` path (modeled here as
//! [`crate::runtime::CoreRuntime::on_receive`]) on the main thread.

pub mod memory;
pub mod udp;

use crate::error::CoreResult;
use crate::message::{Destination, Message};
use crate::node_id::NodeId;

/// The transport collaborator the core requires. Implementations must
/// deliver a `Destination::Peer(self.my_id())` or
/// `Destination::AllIncludingSelf` send back to the caller through the same
/// path as a remote message — there is no separate loopback mechanism in
/// the core.
pub trait ClusterTransport {
    fn my_id(&self) -> NodeId;

    /// The current cluster view's size. The core recomputes majority
    /// (`cluster_size() / 2 + 1`) from this on every tally rather than
    /// caching it, since the cluster view is not guaranteed stable.
    fn cluster_size(&self) -> usize;

    fn send(&self, destination: Destination, message: Message) -> CoreResult<()>;
}
