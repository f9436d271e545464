//! A thin framing layer over one [`Log`] — named operations serialized
//! onto the log and dispatched back out to the operation that produced them.

use std::collections::HashMap;

use log::error;

use crate::control::LogDump;
use crate::error::{CoreError, CoreResult};
use crate::log::Log;
use crate::node_id::{LogName, NodeId, SlotId};
use crate::message::Message;
use crate::runtime::{dump_log, DynLog};
use crate::transport::ClusterTransport;

/// `(state, payload, additional_data?) -> ()`.
pub type OpHandler<S, H> = Box<dyn FnMut(&mut S, &[u8], Option<H>)>;

/// Wraps a [`Log`] plus a shared `state: S`, dispatching each decided entry
/// to the op-handler named in its frame.
pub struct ReplicatedType<S, H> {
    log: Log<H>,
    state: S,
    handlers: HashMap<String, OpHandler<S, H>>,
}

impl<S, H> ReplicatedType<S, H> {
    pub fn new(name: LogName, my_id: NodeId, state: S) -> Self {
        ReplicatedType {
            log: Log::new(name, my_id),
            state,
            handlers: HashMap::new(),
        }
    }

    pub fn register_op(&mut self, op_name: &str, handler: OpHandler<S, H>) {
        self.handlers.insert(op_name.to_string(), handler);
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn log(&self) -> &Log<H> {
        &self.log
    }

    /// Concatenates `op_name ∥ payload` into one [`crate::log::Log::send`]
    /// call.
    pub fn apply(
        &mut self,
        transport: &dyn ClusterTransport,
        op_name: &str,
        payload: &[u8],
        additional_data: Option<H>,
    ) -> CoreResult<SlotId> {
        let framed = encode_op(op_name, payload);
        self.log.send(transport, &framed, additional_data)
    }

    /// Drives the underlying log and dispatches anything it delivers. A
    /// handler error is logged and otherwise swallowed.
    pub fn on_receive(&mut self, transport: &dyn ClusterTransport, sender: NodeId, message: Message) -> CoreResult<()> {
        let delivered = self.log.on_receive(transport, sender, message)?;
        for entry in delivered {
            let slot = entry.slot;
            if let Err(err) = self.dispatch(entry.payload, entry.additional_data) {
                error!("op-handler error on log {:?} at slot {}: {}", self.log.name(), slot, err);
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, framed: Vec<u8>, additional_data: Option<H>) -> CoreResult<()> {
        let (op_name, payload) = decode_op(&framed)?;
        match self.handlers.get_mut(&op_name) {
            Some(handler) => {
                handler(&mut self.state, &payload, additional_data);
                Ok(())
            }
            None => Err(CoreError::UnknownOp(op_name)),
        }
    }
}

impl<S, H> DynLog for ReplicatedType<S, H> {
    fn name(&self) -> &LogName {
        self.log.name()
    }

    fn on_receive(&mut self, transport: &dyn ClusterTransport, sender: NodeId, message: Message) -> CoreResult<()> {
        ReplicatedType::on_receive(self, transport, sender, message)
    }

    fn dump(&self) -> LogDump {
        dump_log(&self.log)
    }
}

fn encode_op(op_name: &str, payload: &[u8]) -> Vec<u8> {
    let name_bytes = op_name.as_bytes();
    let mut framed = Vec::with_capacity(8 + name_bytes.len() + payload.len());
    framed.extend_from_slice(&(name_bytes.len() as u64).to_le_bytes());
    framed.extend_from_slice(name_bytes);
    framed.extend_from_slice(payload);
    framed
}

fn decode_op(bytes: &[u8]) -> CoreResult<(String, Vec<u8>)> {
    if bytes.len() < 8 {
        return Err(CoreError::MalformedOpFrame("frame shorter than the length prefix"));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[..8]);
    let name_len = u64::from_le_bytes(len_bytes) as usize;
    if bytes.len() < 8 + name_len {
        return Err(CoreError::MalformedOpFrame("frame shorter than its declared op-name length"));
    }
    let name = String::from_utf8(bytes[8..8 + name_len].to_vec())
        .map_err(|_| CoreError::MalformedOpFrame("op name is not valid UTF-8"))?;
    let payload = bytes[8 + name_len..].to_vec();
    Ok((name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_op_frame() {
        let framed = encode_op("add", &[1, 2, 3]);
        let (name, payload) = decode_op(&framed).unwrap();
        assert_eq!(name, "add");
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_truncated_frame() {
        assert!(decode_op(&[0, 0, 0]).is_err());
    }
}
