//! The consensus log: one [`Instance`] per slot, ordered delivery, and
//! re-proposal of preempted local values.

use std::collections::BTreeMap;

use log::{debug, info, log_enabled, Level};

use crate::error::CoreResult;
use crate::message::{Destination, Message, Value};
use crate::node_id::{LogName, NodeId, SlotId};
use crate::paxos::{AcceptorReply, Instance, LearnerAction, ProposerAction};
use crate::transport::ClusterTransport;

/// One value delivered to the host, in slot order, with whatever
/// `additional_data` handle was attached when it was first proposed. `additional_data` is `Some` only on the shard that originally
/// called [`Log::send`] for this value.
pub struct Delivered<H> {
    pub slot: SlotId,
    pub payload: Vec<u8>,
    pub additional_data: Option<H>,
}

/// A single named replicated log. Held by
/// [`crate::runtime::CoreRuntime`] keyed by [`LogName`]; never referenced by
/// more than one runtime.
pub struct Log<H> {
    name: LogName,
    my_id: NodeId,
    instances: BTreeMap<SlotId, Instance<H>>,
    next_slot_to_allocate: SlotId,
    next_slot_to_deliver: SlotId,
}

impl<H> Log<H> {
    pub fn new(name: LogName, my_id: NodeId) -> Self {
        Log {
            name,
            my_id,
            instances: BTreeMap::new(),
            next_slot_to_allocate: 0,
            next_slot_to_deliver: 0,
        }
    }

    pub fn name(&self) -> &LogName {
        &self.name
    }

    pub fn next_slot_to_allocate(&self) -> SlotId {
        self.next_slot_to_allocate
    }

    pub fn next_slot_to_deliver(&self) -> SlotId {
        self.next_slot_to_deliver
    }

    /// Every known instance, slot-ascending.
    pub fn instances(&self) -> impl Iterator<Item = (SlotId, &Instance<H>)> {
        self.instances.iter().map(|(slot, instance)| (*slot, instance))
    }

    /// Proposes `payload` into a freshly allocated slot.
    /// `additional_data` travels with the proposal and is handed back
    /// un-serialized through [`Delivered`] once (and only if) this shard's
    /// value is the one that decides — re-proposal after preemption
    /// carries it forward to the new slot.
    pub fn send(
        &mut self,
        transport: &dyn ClusterTransport,
        payload: &[u8],
        additional_data: Option<H>,
    ) -> CoreResult<SlotId> {
        let value = Value::with_origin_prefix(self.my_id, payload);
        self.allocate_and_propose(transport, value, additional_data)
    }

    fn allocate_and_propose(
        &mut self,
        transport: &dyn ClusterTransport,
        value: Value,
        additional_data: Option<H>,
    ) -> CoreResult<SlotId> {
        let slot = self.next_slot_to_allocate;
        self.next_slot_to_allocate += 1;
        let instance = self.instances.entry(slot).or_insert_with(Instance::default);
        let proposal = instance.begin_proposal(self.my_id, value, additional_data);
        transport.send(
            Destination::AllIncludingSelf,
            Message::Recruit {
                log: self.name.clone(),
                slot,
                proposal,
            },
        )?;
        Ok(slot)
    }

    /// Drops every decided slot strictly before `slot` from memory. Does not touch `next_slot_to_deliver`; calling this on a slot
    /// not yet delivered would simply make that slot undeliverable, so the
    /// host is responsible for only collecting what it has consumed.
    pub fn gc_before(&mut self, slot: SlotId) {
        self.instances.retain(|&s, instance| s >= slot || !instance.is_decided());
    }

    /// Drives the log's reaction to one inbound Paxos message,
    /// returning every value that became deliverable as a result, in slot
    /// order.
    pub fn on_receive(
        &mut self,
        transport: &dyn ClusterTransport,
        sender: NodeId,
        message: Message,
    ) -> CoreResult<Vec<Delivered<H>>> {
        let majority = transport.cluster_size() / 2 + 1;
        let slot = message.slot();
        let log = self.name.clone();
        let instance = self.instances.entry(slot).or_insert_with(Instance::default);

        let mut just_decided = false;

        if log_enabled!(Level::Debug) {
            debug!("[{}:{}@{}] received {} from {}", log, slot, self.my_id, message.kind(), sender);
        }

        match message {
            Message::Recruit { proposal, .. } => {
                match instance.handle_recruit(proposal) {
                    AcceptorReply::Recruited {
                        proposal,
                        prior_proposal,
                        prior_value,
                    } => {
                        if log_enabled!(Level::Debug) {
                            debug!("[{}:{}@{}] recruited under proposal {}", log, slot, self.my_id, proposal);
                        }
                        transport.send(
                            Destination::Peer(sender),
                            Message::Recruited {
                                log,
                                slot,
                                proposal,
                                prior_proposal,
                                prior_value,
                            },
                        )?
                    }
                    AcceptorReply::Denied { seen } => {
                        if log_enabled!(Level::Debug) {
                            debug!("[{}:{}@{}] denied Recruit {}, already saw {}", log, slot, self.my_id, proposal, seen);
                        }
                        transport.send(Destination::Peer(sender), Message::Denied { log, slot, seen })?
                    }
                    _ => unreachable!("handle_recruit only returns Recruited or Denied"),
                }
            }
            Message::Accept { proposal, value, .. } => match instance.handle_accept(proposal, value) {
                AcceptorReply::Accepted { proposal, value } => {
                    if log_enabled!(Level::Debug) {
                        debug!("[{}:{}@{}] accepted proposal {}", log, slot, self.my_id, proposal);
                    }
                    transport.send(Destination::Peer(sender), Message::Accepted { log: log.clone(), slot, proposal })?;
                    transport.send(
                        Destination::AllIncludingSelf,
                        Message::Learn {
                            log,
                            slot,
                            proposal,
                            value,
                        },
                    )?;
                }
                AcceptorReply::AcceptDenied { seen } => {
                    if log_enabled!(Level::Debug) {
                        debug!("[{}:{}@{}] denied Accept {}, already saw {}", log, slot, self.my_id, proposal, seen);
                    }
                    transport.send(Destination::Peer(sender), Message::AcceptDenied { log, slot, seen })?
                }
                _ => unreachable!("handle_accept only returns Accepted or AcceptDenied"),
            },
            Message::Recruited {
                proposal,
                prior_proposal,
                prior_value,
                ..
            } => {
                if let ProposerAction::BroadcastAccept { proposal, value } =
                    instance.handle_recruited(proposal, prior_proposal, prior_value, majority)
                {
                    if log_enabled!(Level::Info) {
                        info!("[{}:{}@{}] majority recruited, broadcasting Accept {}", log, slot, self.my_id, proposal);
                    }
                    transport.send(
                        Destination::AllIncludingSelf,
                        Message::Accept {
                            log,
                            slot,
                            proposal,
                            value,
                        },
                    )?;
                }
            }
            Message::Denied { seen, .. } => {
                if let ProposerAction::BroadcastRecruit { proposal } = instance.handle_denied(self.my_id, seen) {
                    if log_enabled!(Level::Info) {
                        info!("[{}:{}@{}] restarting after Denied, broadcasting Recruit {}", log, slot, self.my_id, proposal);
                    }
                    transport.send(Destination::AllIncludingSelf, Message::Recruit { log, slot, proposal })?;
                }
            }
            Message::Accepted { proposal, .. } => {
                // A majority reaching Done needs no further send; the
                // decision itself arrives separately via Learn.
                if let ProposerAction::Done = instance.handle_accepted(proposal, majority) {
                    if log_enabled!(Level::Info) {
                        info!("[{}:{}@{}] majority accepted proposal {}", log, slot, self.my_id, proposal);
                    }
                }
            }
            Message::AcceptDenied { seen, .. } => {
                if let ProposerAction::BroadcastRecruit { proposal } =
                    instance.handle_accept_denied(self.my_id, seen)
                {
                    if log_enabled!(Level::Info) {
                        info!("[{}:{}@{}] restarting after AcceptDenied, broadcasting Recruit {}", log, slot, self.my_id, proposal);
                    }
                    transport.send(Destination::AllIncludingSelf, Message::Recruit { log, slot, proposal })?;
                }
            }
            Message::Learn { proposal, value, .. } => {
                if let LearnerAction::Decided = instance.handle_learn(proposal, value, majority) {
                    just_decided = true;
                    if log_enabled!(Level::Info) {
                        info!("[{}:{}@{}] decided under proposal {}", log, slot, self.my_id, proposal);
                    }
                }
            }
        }

        let mut delivered = Vec::new();
        if just_decided {
            self.reproprose_if_preempted(transport, slot)?;
            self.try_deliver(&mut delivered);
        }
        Ok(delivered)
    }

    /// If this shard originally proposed into `slot` but a different
    /// value decided there, its proposal was preempted — re-propose the
    /// same value (and its `additional_data`) into a fresh slot so it is
    /// not silently lost.
    fn reproprose_if_preempted(&mut self, transport: &dyn ClusterTransport, slot: SlotId) -> CoreResult<()> {
        let preempted_value = {
            let instance = self.instances.get(&slot).expect("slot just decided must exist");
            match (instance.original_proposed_value(), instance.learned_value()) {
                (Some(original), Some(learned)) if original != learned => Some(original.clone()),
                _ => None,
            }
        };

        if let Some(value) = preempted_value {
            let additional_data = self
                .instances
                .get_mut(&slot)
                .expect("slot just decided must exist")
                .take_additional_data();
            self.allocate_and_propose(transport, value, additional_data)?;
        }
        Ok(())
    }

    /// Walks `next_slot_to_deliver` forward over every already-decided,
    /// not-yet-delivered, contiguous slot.
    fn try_deliver(&mut self, out: &mut Vec<Delivered<H>>) {
        loop {
            let slot = self.next_slot_to_deliver;
            let instance = match self.instances.get_mut(&slot) {
                Some(instance) => instance,
                None => break,
            };
            if !instance.is_decided() || instance.callback_fired() {
                break;
            }
            let value = instance.learned_value().expect("checked is_decided above").clone();
            let payload = value.without_origin_prefix();
            let additional_data = instance.take_additional_data();
            instance.mark_callback_fired();
            out.push(Delivered {
                slot,
                payload,
                additional_data,
            });
            self.next_slot_to_deliver += 1;
        }
    }
}
