//! A concrete [`ClusterTransport`] over UDP sockets: one unicast socket
//! per shard, addressed via [`ClusterConfig`]. Every send — including a
//! self-addressed `AllIncludingSelf` broadcast — goes out through the
//! same socket and is read back by the same `recv` loop, so a
//! self-addressed send is delivered back on the same logical path as a
//! remote one, with no special-cased shortcut.

use std::net::UdpSocket;

use log::{debug, log_enabled, Level};

use crate::config::ClusterConfig;
use crate::error::CoreResult;
use crate::message::{Destination, Message};
use crate::node_id::NodeId;
use crate::transport::ClusterTransport;

/// The wire envelope: every datagram carries its sender's [`NodeId`]
/// alongside the [`Message`], so the receiver needs no reverse address
/// lookup (robust to NAT / multiple shards sharing a host).
type Envelope = (NodeId, Message);

pub struct UdpTransport {
    socket: UdpSocket,
    my_id: NodeId,
    config: ClusterConfig,
}

impl UdpTransport {
    /// Binds a UDP socket at the local node's configured address, returning
    /// a `Result` instead of panicking on failure.
    pub fn bind(config: ClusterConfig) -> CoreResult<Self> {
        let my_id = config.local_node;
        let addr = config.address_of(my_id)?;
        let socket = UdpSocket::bind(addr)?;
        Ok(UdpTransport {
            socket,
            my_id,
            config,
        })
    }

    /// Blocking receive of one inbound envelope, decoded with `bincode`.
    pub fn recv(&self) -> CoreResult<(NodeId, Message)> {
        let mut buf = vec![0u8; 1 << 16];
        let (n, _src) = self.socket.recv_from(&mut buf)?;
        let (sender, message): Envelope = bincode::deserialize(&buf[..n])?;
        if log_enabled!(Level::Debug) {
            debug!(
                "[{}] received {} for {:?} from {}",
                self.my_id,
                message.kind(),
                message.log_name(),
                sender
            );
        }
        Ok((sender, message))
    }
}

impl ClusterTransport for UdpTransport {
    fn my_id(&self) -> NodeId {
        self.my_id
    }

    fn cluster_size(&self) -> usize {
        self.config.cluster_size()
    }

    fn send(&self, destination: Destination, message: Message) -> CoreResult<()> {
        let envelope: Envelope = (self.my_id, message);
        let encoded = bincode::serialize(&envelope)?;

        match destination {
            Destination::Peer(node) => {
                let addr = self.config.address_of(node)?;
                self.socket.send_to(&encoded, addr)?;
            }
            Destination::AllIncludingSelf => {
                for addr in self.config.peers.values() {
                    self.socket.send_to(&encoded, addr)?;
                }
            }
        }
        Ok(())
    }
}
