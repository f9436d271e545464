//! A single Paxos instance (one slot of one log), with proposer, acceptor
//! and learner co-resident on every shard. There is no distinguished
//! leader; any shard may initiate a proposal at any time.
//!
//! The three roles are plain fields of [`Instance`], not separately owned
//! objects, and [`Instance`] never holds a back-reference to its containing
//! [`crate::log::Log`] — [`crate::log::Log`] drives every role method
//! explicitly and reacts to the returned outcome.

use crate::message::Value;
use crate::node_id::{NodeId, ProposalNumber};

/// Bits reserved for the per-proposer tie-break appended to every
/// proposal number, so that two shards racing to propose at the same
/// nominal round never produce the *same* proposal number (classical
/// Paxos requires proposal numbers be unique per proposer, not merely
/// monotone). A 16-bit tie-break keeps the number a plain `u64` (rather
/// than a `(round, NodeId)` pair) so it stays a single field on the wire.
const TIE_BREAK_BITS: u32 = 16;

fn tie_break(node: NodeId) -> u64 {
    let bytes = node.as_bytes();
    (u64::from(bytes[14]) << 8) | u64::from(bytes[15])
}

fn compose_proposal(round: u64, node: NodeId) -> ProposalNumber {
    (round << TIE_BREAK_BITS) | tie_break(node)
}

fn round_of(proposal: ProposalNumber) -> u64 {
    proposal >> TIE_BREAK_BITS
}

/// "phase ∈ {PhaseOne, PhaseTwo, Done}".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PhaseOne,
    PhaseTwo,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::PhaseOne => "PhaseOne",
            Phase::PhaseTwo => "PhaseTwo",
            Phase::Done => "Done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct ProposerState {
    proposal_number: ProposalNumber,
    highest_competing_number_seen: ProposalNumber,
    value_to_propose: Option<Value>,
    recruited: usize,
    accepted: usize,
}

#[derive(Debug, Default)]
struct AcceptorState {
    highest_promised_number: ProposalNumber,
    last_accepted_value: Option<Value>,
}

#[derive(Debug, Default)]
struct LearnerState {
    proposal_number_for_learn_tally: ProposalNumber,
    learn_count: usize,
    /// The value tentatively associated with `proposal_number_for_learn_tally`,
    /// held until a majority of `Learn` messages for that number arrive.
    tally_value: Option<Value>,
    learned_value: Option<Value>,
}

/// Holds the Paxos state for all three roles at one shard, for one slot of
/// one log.
pub struct Instance<H> {
    phase: Phase,
    proposer: ProposerState,
    acceptor: AcceptorState,
    learner: LearnerState,
    /// Set only on the shard that originally proposed into this slot, to
    /// detect "my value got preempted".
    original_proposed_value: Option<Value>,
    /// Caller-owned handle that travels with the original proposal on the
    /// proposing shard only.
    additional_data: Option<H>,
    callback_fired: bool,
}

impl<H> Default for Instance<H> {
    fn default() -> Self {
        Instance {
            phase: Phase::PhaseOne,
            proposer: ProposerState::default(),
            acceptor: AcceptorState::default(),
            learner: LearnerState::default(),
            original_proposed_value: None,
            additional_data: None,
            callback_fired: false,
        }
    }
}

/// What the containing log should do after a proposer-role method runs.
#[derive(Debug)]
pub enum ProposerAction {
    /// Nothing to send yet.
    None,
    /// (Re-)broadcast `Recruit(proposal)` to every shard including self.
    BroadcastRecruit { proposal: ProposalNumber },
    /// Majority of promises reached — broadcast `Accept(proposal, value)`.
    BroadcastAccept {
        proposal: ProposalNumber,
        value: Value,
    },
    /// Majority of acceptances reached — this shard's proposer is done.
    Done,
}

/// What the containing log should send in reply to an acceptor-role
/// method.
#[derive(Debug)]
pub enum AcceptorReply {
    Recruited {
        proposal: ProposalNumber,
        prior_proposal: ProposalNumber,
        prior_value: Option<Value>,
    },
    Denied {
        seen: ProposalNumber,
    },
    Accepted {
        proposal: ProposalNumber,
        value: Value,
    },
    AcceptDenied {
        seen: ProposalNumber,
    },
}

/// What the containing log should do after a learner-role method runs.
#[derive(Debug)]
pub enum LearnerAction {
    /// Tally updated, no decision yet.
    Pending,
    /// This slot just decided. The log should attempt ordered delivery
    /// and, if the learned value differs from this shard's
    /// `original_proposed_value`, re-propose it at a fresh slot.
    Decided,
}

impl<H> Instance<H> {
    /// Starts this shard proposing `value` into a freshly allocated slot.
    /// Returns the initial `Recruit` proposal number.
    pub fn begin_proposal(&mut self, proposer: NodeId, value: Value, additional_data: Option<H>) -> ProposalNumber {
        let proposal_number = compose_proposal(1, proposer);
        self.proposer = ProposerState {
            proposal_number,
            highest_competing_number_seen: 0,
            value_to_propose: Some(value.clone()),
            recruited: 0,
            accepted: 0,
        };
        self.phase = Phase::PhaseOne;
        self.original_proposed_value = Some(value);
        self.additional_data = additional_data;
        proposal_number
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn original_proposed_value(&self) -> Option<&Value> {
        self.original_proposed_value.as_ref()
    }

    pub fn additional_data(&self) -> Option<&H> {
        self.additional_data.as_ref()
    }

    pub fn take_additional_data(&mut self) -> Option<H> {
        self.additional_data.take()
    }

    pub fn learned_value(&self) -> Option<&Value> {
        self.learner.learned_value.as_ref()
    }

    pub fn is_decided(&self) -> bool {
        self.learner.learned_value.is_some()
    }

    pub fn callback_fired(&self) -> bool {
        self.callback_fired
    }

    pub fn mark_callback_fired(&mut self) {
        self.callback_fired = true;
    }

    // ---- Proposer role ----

    /// Phase 1b negative, or Phase 2b negative routed here since both
    /// trigger the identical restart rule.
    pub fn handle_denied(&mut self, me: NodeId, seen: ProposalNumber) -> ProposerAction {
        if self.phase != Phase::PhaseOne {
            return ProposerAction::None;
        }
        self.restart_after_denial(me, seen)
    }

    pub fn handle_accept_denied(&mut self, me: NodeId, seen: ProposalNumber) -> ProposerAction {
        if self.phase != Phase::PhaseTwo {
            return ProposerAction::None;
        }
        // Check staleness before touching phase: a stale AcceptDenied must
        // leave a genuinely in-flight Phase 2 alone, not strand it in
        // Phase 1 with no restart broadcast.
        if self.proposer.proposal_number > seen {
            return ProposerAction::None;
        }
        self.phase = Phase::PhaseOne;
        self.restart_after_denial(me, seen)
    }

    fn restart_after_denial(&mut self, me: NodeId, seen: ProposalNumber) -> ProposerAction {
        // Stale relative to a denial we already handled.
        if self.proposer.proposal_number > seen {
            return ProposerAction::None;
        }
        let next_round = round_of(seen) + 1;
        let proposal_number = compose_proposal(next_round, me);
        self.proposer.proposal_number = proposal_number;
        self.proposer.highest_competing_number_seen = 0;
        self.proposer.recruited = 0;
        self.proposer.accepted = 0;
        ProposerAction::BroadcastRecruit {
            proposal: proposal_number,
        }
    }

    /// Phase 1b positive.
    pub fn handle_recruited(
        &mut self,
        proposal: ProposalNumber,
        prior_proposal: ProposalNumber,
        prior_value: Option<Value>,
        majority: usize,
    ) -> ProposerAction {
        if self.phase != Phase::PhaseOne || proposal != self.proposer.proposal_number {
            return ProposerAction::None;
        }

        if let Some(value) = prior_value {
            if prior_proposal > self.proposer.highest_competing_number_seen {
                self.proposer.highest_competing_number_seen = prior_proposal;
                self.proposer.value_to_propose = Some(value);
            }
        }

        self.proposer.recruited += 1;
        if self.proposer.recruited == majority {
            self.phase = Phase::PhaseTwo;
            let value = self
                .proposer
                .value_to_propose
                .clone()
                .expect("value_to_propose set by begin_proposal before any Recruit is sent");
            ProposerAction::BroadcastAccept { proposal, value }
        } else {
            ProposerAction::None
        }
    }

    /// Phase 2b positive.
    pub fn handle_accepted(&mut self, proposal: ProposalNumber, majority: usize) -> ProposerAction {
        if self.phase != Phase::PhaseTwo || proposal != self.proposer.proposal_number {
            return ProposerAction::None;
        }
        self.proposer.accepted += 1;
        if self.proposer.accepted == majority {
            self.phase = Phase::Done;
            ProposerAction::Done
        } else {
            ProposerAction::None
        }
    }

    // ---- Acceptor role ----

    pub fn handle_recruit(&mut self, proposal: ProposalNumber) -> AcceptorReply {
        if proposal > self.acceptor.highest_promised_number {
            let prior_proposal = self.acceptor.highest_promised_number;
            self.acceptor.highest_promised_number = proposal;
            AcceptorReply::Recruited {
                proposal,
                prior_proposal,
                prior_value: self.acceptor.last_accepted_value.clone(),
            }
        } else {
            AcceptorReply::Denied {
                seen: self.acceptor.highest_promised_number,
            }
        }
    }

    pub fn handle_accept(&mut self, proposal: ProposalNumber, value: Value) -> AcceptorReply {
        if proposal == self.acceptor.highest_promised_number {
            self.acceptor.last_accepted_value = Some(value.clone());
            AcceptorReply::Accepted { proposal, value }
        } else {
            AcceptorReply::AcceptDenied {
                seen: self.acceptor.highest_promised_number,
            }
        }
    }

    // ---- Learner role ----

    pub fn handle_learn(&mut self, proposal: ProposalNumber, value: Value, majority: usize) -> LearnerAction {
        if proposal < self.learner.proposal_number_for_learn_tally {
            return LearnerAction::Pending;
        }
        if proposal > self.learner.proposal_number_for_learn_tally {
            self.learner.proposal_number_for_learn_tally = proposal;
            self.learner.learn_count = 1;
            self.learner.tally_value = Some(value);
            return LearnerAction::Pending;
        }

        self.learner.learn_count += 1;
        if self.learner.learn_count == majority && self.learner.learned_value.is_none() {
            self.learner.learned_value = self.learner.tally_value.clone().or(Some(value));
            LearnerAction::Decided
        } else {
            LearnerAction::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(seed: u8) -> NodeId {
        let mut bytes = [0u8; 16];
        bytes[15] = seed;
        NodeId::from_bytes(bytes)
    }

    #[test]
    fn recruit_promises_increasing_numbers_only() {
        let mut instance = Instance::<()>::default();
        match instance.handle_recruit(10) {
            AcceptorReply::Recruited { prior_proposal, prior_value, .. } => {
                assert_eq!(prior_proposal, 0);
                assert!(prior_value.is_none());
            }
            other => panic!("expected Recruited, got {:?}", other),
        }
        match instance.handle_recruit(5) {
            AcceptorReply::Denied { seen } => assert_eq!(seen, 10),
            other => panic!("expected Denied, got {:?}", other),
        }
    }

    #[test]
    fn accept_matches_exact_promised_number() {
        let mut instance = Instance::<()>::default();
        instance.handle_recruit(7);
        match instance.handle_accept(7, Value(vec![1, 2, 3])) {
            AcceptorReply::Accepted { proposal, value } => {
                assert_eq!(proposal, 7);
                assert_eq!(value, Value(vec![1, 2, 3]));
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
        match instance.handle_accept(6, Value(vec![9])) {
            AcceptorReply::AcceptDenied { seen } => assert_eq!(seen, 7),
            other => panic!("expected AcceptDenied, got {:?}", other),
        }
    }

    #[test]
    fn learner_ignores_stale_resets_on_higher_and_tallies_majority() {
        let mut instance = Instance::<()>::default();
        let v = Value(vec![42]);
        assert!(matches!(instance.handle_learn(5, v.clone(), 2), LearnerAction::Pending));
        assert!(matches!(instance.handle_learn(4, v.clone(), 2), LearnerAction::Pending));
        assert!(matches!(instance.handle_learn(5, v.clone(), 2), LearnerAction::Decided));
        assert_eq!(instance.learned_value(), Some(&v));
    }

    #[test]
    fn proposer_restart_bumps_past_seen_and_resets_counters() {
        let mut instance = Instance::<()>::default();
        let me = node(1);
        let initial = instance.begin_proposal(me, Value(vec![1]), None);
        match instance.handle_denied(me, initial + 1000) {
            ProposerAction::BroadcastRecruit { proposal } => {
                assert!(round_of(proposal) > round_of(initial));
            }
            other => panic!("expected BroadcastRecruit, got {:?}", other),
        }
        // A stale Denied for the old round must now be ignored.
        assert!(matches!(instance.handle_denied(me, initial), ProposerAction::None));
    }

    #[test]
    fn stale_accept_denied_does_not_strand_phase_two() {
        let mut instance = Instance::<()>::default();
        let me = node(1);
        let proposal = instance.begin_proposal(me, Value(vec![7]), None);
        match instance.handle_recruited(proposal, 0, None, 1) {
            ProposerAction::BroadcastAccept { .. } => {}
            other => panic!("expected BroadcastAccept, got {:?}", other),
        }
        assert_eq!(instance.phase(), Phase::PhaseTwo);

        // A stale AcceptDenied, numbered below our current proposal, must
        // be ignored rather than bouncing us back to PhaseOne.
        assert!(matches!(instance.handle_accept_denied(me, proposal - 1), ProposerAction::None));
        assert_eq!(instance.phase(), Phase::PhaseTwo);

        // The real majority of Accepted still reaches Done.
        match instance.handle_accepted(proposal, 1) {
            ProposerAction::Done => {}
            other => panic!("expected Done, got {:?}", other),
        }
        assert_eq!(instance.phase(), Phase::Done);
    }
}
