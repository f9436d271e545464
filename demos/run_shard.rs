//! Runs a single shard over real UDP, reading lines from stdin as values to
//! propose into a log named "demo". Every shard plays proposer, acceptor
//! and learner at once — there is no separate process per role.
//!
//! Usage: `run-shard <cluster-config-file>` (see `config` module docs for
//! the expected TOML shape).

use std::io::{self, BufRead};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use log::{info, log_enabled, warn, Level};

use paxos_core::config::load_cluster_config;
use paxos_core::log::Log;
use paxos_core::message::Message;
use paxos_core::node_id::{LogName, NodeId};
use paxos_core::transport::udp::UdpTransport;
use paxos_core::transport::ClusterTransport;

enum ShardEvent {
    Inbound(NodeId, Message),
    Propose(String),
}

fn main() {
    env_logger::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "Cluster".to_string());
    let config = load_cluster_config(&config_path).expect("failed to load cluster config");
    let my_id = config.local_node;
    let transport = Arc::new(UdpTransport::bind(config).expect("failed to bind UDP transport"));
    let mut log = Log::<()>::new(LogName::new("demo"), my_id);

    let (tx, rx) = mpsc::channel();

    {
        let transport = Arc::clone(&transport);
        let tx = tx.clone();
        thread::spawn(move || loop {
            match transport.recv() {
                Ok((sender, message)) => {
                    if tx.send(ShardEvent::Inbound(sender, message)).is_err() {
                        break;
                    }
                }
                Err(err) => warn!("[{}] recv error: {}", my_id, err),
            }
        });
    }

    {
        let tx = tx.clone();
        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(text) => {
                        if tx.send(ShardEvent::Propose(text)).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }
    drop(tx);

    println!("shard {} ready; type a line to propose it, Ctrl-D to exit", my_id);

    for event in rx {
        match event {
            ShardEvent::Inbound(sender, message) => match log.on_receive(transport.as_ref(), sender, message) {
                Ok(delivered) => {
                    for entry in delivered {
                        println!("[slot {}] decided: {}", entry.slot, String::from_utf8_lossy(&entry.payload));
                    }
                }
                Err(err) => warn!("[{}] on_receive error: {}", my_id, err),
            },
            ShardEvent::Propose(text) => match log.send(transport.as_ref(), text.as_bytes(), None) {
                Ok(slot) => {
                    if log_enabled!(Level::Info) {
                        info!("[{}] proposed into slot {}", my_id, slot);
                    }
                }
                Err(err) => warn!("[{}] send error: {}", my_id, err),
            },
        }
    }
}
