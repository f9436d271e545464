//! End-to-end scenarios covering uncontested and racing proposals, a
//! lagging shard catching up, a denied proposer restarting, operations
//! converging through the replicated-type layer, and out-of-order
//! decisions waiting for the gap to close. Randomized safety and
//! idempotence properties are exercised separately in
//! `safety_proptest.rs`.

mod common;

use common::Cluster;
use paxos_core::message::Message;
use paxos_core::node_id::LogName;
use paxos_core::replicated_type::{OpHandler, ReplicatedType};
use paxos_core::transport::memory::MemoryNetwork;

/// S1: uncontested proposal — every shard decides the same value at slot
/// 0, and `additional_data` surfaces only on the proposing shard.
#[test]
fn s1_uncontested_proposal() {
    let mut cluster = Cluster::<String>::new(3);
    cluster.send(0, b"hello", Some("ctx1".to_string()));

    let deliveries = cluster.run_to_quiescence();
    assert_eq!(deliveries.len(), 3, "all three shards must deliver exactly once");

    for (shard, delivered) in &deliveries {
        assert_eq!(delivered.slot, 0);
        assert_eq!(delivered.payload, b"hello");
        if *shard == 0 {
            assert_eq!(delivered.additional_data.as_deref(), Some("ctx1"));
        } else {
            assert!(delivered.additional_data.is_none());
        }
    }
}

/// S2: a symmetric race between two shards proposing concurrently —
/// every shard ends up delivering both values, in the same order, and the
/// loser is re-proposed and delivered later rather than lost.
#[test]
fn s2_symmetric_race_resolves_deterministically_everywhere() {
    let mut cluster = Cluster::<String>::new(3);
    cluster.send(0, b"a", Some("ctx1".to_string()));
    cluster.send(1, b"b", Some("ctx2".to_string()));

    let deliveries = cluster.run_to_quiescence();

    // Exactly two slots' worth of values must appear per shard (total
    // slots delivered = 2 on each of the 3 shards).
    let mut per_shard: Vec<Vec<Vec<u8>>> = vec![Vec::new(); cluster.ids.len()];
    for (shard, delivered) in &deliveries {
        per_shard[*shard].push(delivered.payload.clone());
    }
    for payloads in &per_shard {
        assert_eq!(payloads.len(), 2, "each shard must deliver exactly two values");
    }
    // Every shard must see the same sequence of values, in the same
    // order, with no slot disagreeing between shards.
    for shard_payloads in &per_shard[1..] {
        assert_eq!(shard_payloads, &per_shard[0]);
    }
    assert!(per_shard[0].contains(&b"a".to_vec()));
    assert!(per_shard[0].contains(&b"b".to_vec()));

    // ctx1 and ctx2 each surface exactly once across the whole cluster, on
    // their originating shard.
    let ctx1_deliveries: Vec<_> = deliveries
        .iter()
        .filter(|(_, d)| d.additional_data.as_deref() == Some("ctx1"))
        .collect();
    let ctx2_deliveries: Vec<_> = deliveries
        .iter()
        .filter(|(_, d)| d.additional_data.as_deref() == Some("ctx2"))
        .collect();
    assert_eq!(ctx1_deliveries.len(), 1);
    assert_eq!(ctx1_deliveries[0].0, 0);
    assert_eq!(ctx2_deliveries.len(), 1);
    assert_eq!(ctx2_deliveries[0].0, 1);
}

/// S3 (acceptor lag, generalized without real time): hold back one
/// shard's messages while the other two run to completion, then let the
/// straggler catch up. It must learn the exact same value at the exact
/// same slot.
#[test]
fn s3_lagging_shard_catches_up_to_the_same_value() {
    let mut cluster = Cluster::<()>::new(3);
    cluster.send(0, b"hello", None);

    // Drain only shard 0 and 1's mailboxes; leave shard 2's queued.
    let mut deliveries = Vec::new();
    loop {
        let mut progressed = false;
        for i in [0usize, 1] {
            while let Some((sender, message)) = cluster.transports[i].pop_one() {
                progressed = true;
                let delivered = cluster.logs[i]
                    .on_receive(&cluster.transports[i], sender, message)
                    .unwrap();
                deliveries.extend(delivered.into_iter().map(|d| (i, d)));
            }
        }
        if !progressed {
            break;
        }
    }
    assert!(deliveries.iter().any(|(shard, d)| *shard == 0 && d.slot == 0));
    assert!(deliveries.iter().any(|(shard, d)| *shard == 1 && d.slot == 0));
    assert!(!cluster.transports[2].is_empty(), "shard 2 must still have queued messages");

    // Now let shard 2 catch up.
    let rest = cluster.run_to_quiescence();
    let shard2_delivery = rest.iter().find(|(shard, _)| *shard == 2).expect("shard 2 must eventually decide");
    assert_eq!(shard2_delivery.1.slot, 0);
    assert_eq!(shard2_delivery.1.payload, b"hello");
}

/// S4: proposer-denied restart. A synthetic higher `Denied` forces the
/// proposer to bump its proposal number and re-broadcast `Recruit`; the
/// eventual decision still lands at the originally attempted slot.
#[test]
fn s4_denied_proposal_restarts_and_still_decides_at_its_slot() {
    let mut cluster = Cluster::<()>::new(3);
    let slot = cluster.send(0, b"x", None);

    // Shard 0 just broadcast Recruit to all three shards including
    // itself; consume its own copy without acting on it, and instead feed
    // in a synthetic Denied with a number far beyond anything it has
    // used yet.
    let (_, recruit) = cluster.transports[0].pop_one().expect("self-addressed Recruit queued");
    assert!(matches!(recruit, Message::Recruit { .. }));

    let denied = Message::Denied {
        log: LogName::new("demo"),
        slot,
        seen: 1 << 20,
    };
    let delivered = cluster.logs[0]
        .on_receive(&cluster.transports[0], cluster.ids[0], denied)
        .unwrap();
    assert!(delivered.is_empty(), "a Denied never delivers anything by itself");

    // Shard 0 must have re-broadcast a Recruit with a strictly higher
    // proposal number to all three shards (including itself).
    let mut saw_recruit_everywhere = true;
    for (i, transport) in cluster.transports.iter().enumerate() {
        if i == 0 {
            continue;
        }
        saw_recruit_everywhere &= !transport.is_empty();
    }
    assert!(saw_recruit_everywhere);
    let (_, rebroadcast) = cluster.transports[0].pop_one().expect("shard 0 requeued its own Recruit too");
    match rebroadcast {
        Message::Recruit { proposal, .. } => assert!(proposal > 1 << 20),
        other => panic!("expected a re-broadcast Recruit, got {:?}", other),
    }

    let rest = cluster.run_to_quiescence();
    assert!(rest.iter().any(|(shard, d)| *shard == 0 && d.slot == slot && d.payload == b"x"));
}

/// S5 — operations applied through the replicated-type layer apply in the
/// same order on every shard and the replicated state converges bytewise.
#[test]
fn s5_ops_through_replicated_type_apply_in_the_same_order() {
    let ids: Vec<_> = (0..2u8).map(common::shard_id).collect();
    let network = MemoryNetwork::new(ids.clone());

    let make_handler = || -> OpHandler<Vec<String>, ()> {
        Box::new(|state: &mut Vec<String>, payload: &[u8], _| {
            state.push(String::from_utf8_lossy(payload).to_string());
        })
    };

    let mut replicas: Vec<ReplicatedType<Vec<String>, ()>> = ids
        .iter()
        .map(|id| {
            let mut r = ReplicatedType::new(LogName::new("ops"), *id, Vec::new());
            r.register_op("add", make_handler());
            r.register_op("remove", make_handler());
            r
        })
        .collect();
    let transports: Vec<_> = ids.iter().map(|id| network.transport_for(*id)).collect();

    replicas[0].apply(&transports[0], "add", b"blob1", None).unwrap();
    replicas[1].apply(&transports[1], "remove", b"id2", None).unwrap();

    loop {
        let mut progressed = false;
        for i in 0..ids.len() {
            while let Some((sender, message)) = transports[i].pop_one() {
                progressed = true;
                replicas[i].on_receive(&transports[i], sender, message).unwrap();
            }
        }
        if !progressed {
            break;
        }
    }

    assert_eq!(replicas[0].state(), replicas[1].state());
    assert_eq!(replicas[0].state().len(), 2);
}

/// S6 — a later slot deciding before an earlier one must not be
/// delivered out of order; delivery waits for the gap to close.
#[test]
fn s6_out_of_order_decision_waits_for_the_gap() {
    let mut cluster = Cluster::<()>::new(3);

    // Fabricate slot 1 deciding first, entirely via synthetic Learn
    // messages (bypassing real proposing, since only the learner's
    // gap-respecting delivery is under test here).
    let log = LogName::new("demo");
    let value_1 = paxos_core::message::Value::with_origin_prefix(cluster.ids[0], b"second");
    for sender_index in 0..3 {
        let delivered = cluster.logs[0]
            .on_receive(
                &cluster.transports[0],
                cluster.ids[sender_index],
                Message::Learn {
                    log: log.clone(),
                    slot: 1,
                    proposal: 1 << 16,
                    value: value_1.clone(),
                },
            )
            .unwrap();
        assert!(delivered.is_empty(), "slot 1 must not deliver while slot 0 is undecided");
    }

    // Now slot 0 decides; both must flush in order.
    let value_0 = paxos_core::message::Value::with_origin_prefix(cluster.ids[0], b"first");
    let mut delivered = Vec::new();
    for sender_index in 0..3 {
        delivered.extend(
            cluster.logs[0]
                .on_receive(
                    &cluster.transports[0],
                    cluster.ids[sender_index],
                    Message::Learn {
                        log: log.clone(),
                        slot: 0,
                        proposal: 1 << 16,
                        value: value_0.clone(),
                    },
                )
                .unwrap(),
        );
    }

    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].slot, 0);
    assert_eq!(delivered[0].payload, b"first");
    assert_eq!(delivered[1].slot, 1);
    assert_eq!(delivered[1].payload, b"second");
}
