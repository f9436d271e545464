//! A specific [`ReplicatedType`] instance whose two operations, `add` and
//! `remove`, keep a keyed map of pipeline registrations in lock-step
//! across the cluster.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::control::{LogDump, RegistrationDump};
use crate::error::CoreResult;
use crate::log::Log;
use crate::message::Message;
use crate::node_id::{LogName, NodeId, SlotId};
use crate::replicated_type::ReplicatedType;
use crate::runtime::DynLog;
use crate::transport::ClusterTransport;

/// A fixed-width, opaque registration identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(pub String);

/// One entry in the map: an opaque pipeline descriptor plus the
/// registration's `reader_type`/`description`, as surfaced by `dump`.
#[derive(Debug, Clone)]
pub struct Registration {
    pub reader_type: String,
    pub description: String,
    pub descriptor: Vec<u8>,
    pub routing_key: String,
}

/// The reader/registration upcalls the map drives on delivery. The map
/// neither inspects `descriptor` nor the events flowing through the
/// installed pipeline.
pub trait Reader {
    type Handle;

    fn install_pipeline(&mut self, descriptor: &[u8], routing_key: &str) -> Self::Handle;
    fn tear_down_pipeline(&mut self, handle: Self::Handle);

    /// Whether this reader can tear a pipeline back down once installed.
    /// Readers that cannot must still accept the `remove` entry being
    /// dropped from the map; they just never get a teardown callback.
    fn supports_unregister(&self) -> bool {
        true
    }
}

/// Outcome of a `remove`, delivered only on the shard that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    UnregisterUnsupported,
}

/// A caller-owned handle the map hands back exactly once, to the shard that
/// issued the corresponding `remove` — the core's equivalent of replying to
/// a blocked client.
pub trait ReplyTarget {
    fn reply(self: Box<Self>, outcome: RemoveOutcome);
}

struct Entry<R: Reader> {
    registration: Registration,
    handle: R::Handle,
}

struct MapState<R: Reader> {
    entries: HashMap<RegistrationId, Entry<R>>,
    reader: R,
}

/// A keyed registration map, built on [`ReplicatedType`] with
/// `additional_data = Box<dyn ReplyTarget>` (present only for `remove`, and
/// only on the originating shard).
pub struct RegistrationMap<R: Reader> {
    replicated: ReplicatedType<MapState<R>, Box<dyn ReplyTarget>>,
}

#[derive(Serialize, Deserialize)]
struct AddFrame {
    id: RegistrationId,
    reader_type: String,
    description: String,
    descriptor: Vec<u8>,
    routing_key: String,
}

#[derive(Serialize, Deserialize)]
struct RemoveFrame {
    id: RegistrationId,
}

impl<R: Reader + 'static> RegistrationMap<R> {
    pub fn new(name: LogName, my_id: NodeId, reader: R) -> Self {
        let mut replicated = ReplicatedType::new(
            name,
            my_id,
            MapState {
                entries: HashMap::new(),
                reader,
            },
        );

        replicated.register_op(
            "add",
            Box::new(|state, payload, _additional_data| {
                let frame: AddFrame = match bincode::deserialize(payload) {
                    Ok(frame) => frame,
                    Err(_) => return,
                };
                let handle = state
                    .reader
                    .install_pipeline(&frame.descriptor, &frame.routing_key);
                state.entries.insert(
                    frame.id,
                    Entry {
                        registration: Registration {
                            reader_type: frame.reader_type,
                            description: frame.description,
                            descriptor: frame.descriptor,
                            routing_key: frame.routing_key,
                        },
                        handle,
                    },
                );
            }),
        );

        replicated.register_op(
            "remove",
            Box::new(|state, payload, additional_data| {
                let frame: RemoveFrame = match bincode::deserialize(payload) {
                    Ok(frame) => frame,
                    Err(_) => return,
                };
                let outcome = if !state.entries.contains_key(&frame.id) {
                    RemoveOutcome::NotFound
                } else if !state.reader.supports_unregister() {
                    RemoveOutcome::UnregisterUnsupported
                } else {
                    let entry = state.entries.remove(&frame.id).expect("just checked contains_key");
                    state.reader.tear_down_pipeline(entry.handle);
                    RemoveOutcome::Removed
                };
                if let Some(reply_target) = additional_data {
                    reply_target.reply(outcome);
                }
            }),
        );

        RegistrationMap { replicated }
    }

    /// Proposes an `add(id, pipeline_blob, routing_key)`. Never carries a
    /// reply target — `add` has no client-visible reply, unlike `remove`.
    pub fn add(
        &mut self,
        transport: &dyn ClusterTransport,
        id: RegistrationId,
        reader_type: String,
        description: String,
        descriptor: Vec<u8>,
        routing_key: String,
    ) -> CoreResult<SlotId> {
        let frame = AddFrame {
            id,
            reader_type,
            description,
            descriptor,
            routing_key,
        };
        let payload = bincode::serialize(&frame)?;
        self.replicated.apply(transport, "add", &payload, None)
    }

    /// Proposes a `remove(id)`. `reply_target` is `Some` only on the
    /// shard making the request; it is delivered back exactly once, on
    /// this shard's own delivery of this op.
    pub fn remove(
        &mut self,
        transport: &dyn ClusterTransport,
        id: RegistrationId,
        reply_target: Option<Box<dyn ReplyTarget>>,
    ) -> CoreResult<SlotId> {
        let frame = RemoveFrame { id };
        let payload = bincode::serialize(&frame)?;
        self.replicated.apply(transport, "remove", &payload, reply_target)
    }

    pub fn on_receive(&mut self, transport: &dyn ClusterTransport, sender: NodeId, message: Message) -> CoreResult<()> {
        self.replicated.on_receive(transport, sender, message)
    }

    pub fn log(&self) -> &Log<Box<dyn ReplyTarget>> {
        self.replicated.log()
    }

    /// Read-only, local: any shard's dump is a
    /// valid view because the map is kept in lock-step by the log.
    pub fn dump(&self) -> Vec<(RegistrationId, Registration)> {
        self.replicated
            .state()
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.registration.clone()))
            .collect()
    }
}

impl<R: Reader + 'static> DynLog for RegistrationMap<R> {
    fn name(&self) -> &LogName {
        self.replicated.log().name()
    }

    fn on_receive(&mut self, transport: &dyn ClusterTransport, sender: NodeId, message: Message) -> CoreResult<()> {
        RegistrationMap::on_receive(self, transport, sender, message)
    }

    fn dump(&self) -> LogDump {
        self.replicated.dump()
    }

    fn as_registration_dump(&self) -> Option<Vec<RegistrationDump>> {
        Some(self.dump().into_iter().map(RegistrationDump::from).collect())
    }
}
