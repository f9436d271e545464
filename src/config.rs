//! Cluster topology loading: a single `NodeId -> SocketAddr` map plus the
//! local shard's own id, parsed with `config` + `toml`.
//!
//! Example `Cluster.toml`:
//!
//! ```toml
//! local_node = "3fa85f64-5717-4562-b3fc-2c963f66afa6"
//!
//! [nodes]
//! "3fa85f64-5717-4562-b3fc-2c963f66afa6" = "127.0.0.1:7001"
//! "9c858901-8a57-4791-81fe-4c455b099bc9" = "127.0.0.1:7002"
//! "2cf24dba-5fb0-a30e-26e8-3b3c1e4b9e1c" = "127.0.0.1:7003"
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use config::{Config, File};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::node_id::NodeId;

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub local_node: NodeId,
    pub peers: HashMap<NodeId, SocketAddr>,
}

impl ClusterConfig {
    pub fn cluster_size(&self) -> usize {
        self.peers.len()
    }

    pub fn address_of(&self, node: NodeId) -> CoreResult<SocketAddr> {
        self.peers
            .get(&node)
            .copied()
            .ok_or(CoreError::UnknownPeer(node))
    }
}

/// Reads and parses `file_name` (extension-less, resolved by the `config`
/// crate the same way `configurations::get_config` does) into a
/// [`ClusterConfig`].
pub fn load_cluster_config(file_name: &str) -> CoreResult<ClusterConfig> {
    let raw = read_config(file_name)?;
    parse_config(&raw)
}

fn read_config(file_name: &str) -> CoreResult<RawConfig> {
    let mut c = Config::default();
    c.merge(File::with_name(file_name))
        .map_err(|e| CoreError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    c.try_into::<RawConfig>()
        .map_err(|e| CoreError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[derive(serde::Deserialize)]
struct RawConfig {
    local_node: String,
    nodes: HashMap<String, String>,
}

fn parse_config(raw: &RawConfig) -> CoreResult<ClusterConfig> {
    let mut peers = HashMap::with_capacity(raw.nodes.len());
    for (id_str, addr_str) in &raw.nodes {
        let uuid = Uuid::from_str(id_str)
            .map_err(|e| CoreError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let addr = SocketAddr::from_str(addr_str)
            .map_err(|e| CoreError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        peers.insert(NodeId::from_bytes(*uuid.as_bytes()), addr);
    }

    let local_uuid = Uuid::from_str(&raw.local_node)
        .map_err(|e| CoreError::Transport(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    Ok(ClusterConfig {
        local_node: NodeId::from_bytes(*local_uuid.as_bytes()),
        peers,
    })
}
