//! A single runtime value owns every named log instead of a process-wide
//! dictionary, and is passed explicitly to the transport's receive path —
//! no ambient globals.

use std::collections::HashMap;

use crate::control::{InstanceDump, LogDump, RegistrationDump};
use crate::error::{CoreError, CoreResult};
use crate::log::Log;
use crate::message::Message;
use crate::node_id::{LogName, NodeId};
use crate::transport::ClusterTransport;

/// Anything the runtime can route an inbound message to and dump on
/// request: a bare [`Log`] or a [`crate::replicated_type::ReplicatedType`]
/// built on one.
pub trait DynLog {
    fn name(&self) -> &LogName;
    fn on_receive(&mut self, transport: &dyn ClusterTransport, sender: NodeId, message: Message) -> CoreResult<()>;
    fn dump(&self) -> LogDump;

    /// `Some` only for a registration map; every
    /// other kind of log keeps the default.
    fn as_registration_dump(&self) -> Option<Vec<RegistrationDump>> {
        None
    }
}

pub(crate) fn dump_log<H>(log: &Log<H>) -> LogDump {
    LogDump {
        name: log.name().clone(),
        instances: log
            .instances()
            .map(|(slot, instance)| InstanceDump {
                slot,
                phase: instance.phase().to_string(),
                learned: instance.is_decided(),
                learned_value: instance.learned_value().map(|v| v.without_origin_prefix()),
                callback_fired: instance.callback_fired(),
            })
            .collect(),
    }
}

impl<H> DynLog for Log<H> {
    fn name(&self) -> &LogName {
        Log::name(self)
    }

    fn on_receive(&mut self, transport: &dyn ClusterTransport, sender: NodeId, message: Message) -> CoreResult<()> {
        Log::on_receive(self, transport, sender, message).map(|_delivered| ())
    }

    fn dump(&self) -> LogDump {
        dump_log(self)
    }
}

/// Owns every named log on this shard and routes inbound messages to the
/// right one by [`LogName`], on the main thread.
pub struct CoreRuntime {
    my_id: NodeId,
    logs: HashMap<LogName, Box<dyn DynLog>>,
}

impl CoreRuntime {
    pub fn new(my_id: NodeId) -> Self {
        CoreRuntime {
            my_id,
            logs: HashMap::new(),
        }
    }

    pub fn my_id(&self) -> NodeId {
        self.my_id
    }

    pub fn register_log(&mut self, log: impl DynLog + 'static) {
        self.logs.insert(log.name().clone(), Box::new(log));
    }

    /// Dispatches one inbound message to the log it names, creating
    /// nothing on the runtime's side — unknown (log, slot) pairs are
    /// handled by the log itself; an unknown *log name* is the one
    /// case the runtime surfaces as an error, since there is no instance
    /// to create it on.
    pub fn on_receive(&mut self, transport: &dyn ClusterTransport, sender: NodeId, message: Message) -> CoreResult<()> {
        let name = message.log_name().clone();
        match self.logs.get_mut(&name) {
            Some(log) => log.on_receive(transport, sender, message),
            None => Err(CoreError::UnknownLog(name)),
        }
    }

    /// Dumps every known log's instances, for a debug/control surface.
    pub fn dump_logs(&self) -> Vec<LogDump> {
        self.logs.values().map(|log| log.dump()).collect()
    }

    /// Flattens every registered registration map known to this runtime.
    /// Ordinary logs contribute nothing.
    pub fn dump_registrations(&self) -> Vec<RegistrationDump> {
        self.logs
            .values()
            .filter_map(|log| log.as_registration_dump())
            .flatten()
            .collect()
    }
}
