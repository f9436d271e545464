//! Safety and idempotence of redeliveries, expressed as randomized
//! properties over a small `MemoryTransport`-backed cluster.

mod common;

use std::collections::HashMap;

use proptest::prelude::*;

use common::Cluster;

fn run_concurrent_sends(shard_count: usize, payloads: &[(usize, Vec<u8>)]) -> Cluster<()> {
    let mut cluster = Cluster::<()>::new(shard_count);
    for (shard, payload) in payloads {
        cluster.send(shard % shard_count, payload, None);
    }
    cluster
}

proptest! {
    /// For any randomized set of concurrent `send`s, every SlotId that
    /// two or more shards deliver carries bytewise-identical bytes on all
    /// of them.
    #[test]
    fn p1_single_value_per_slot(
        shard_count in 3usize..6,
        payloads in prop::collection::vec((0usize..6, prop::collection::vec(any::<u8>(), 0..8)), 1..6),
    ) {
        let mut cluster = run_concurrent_sends(shard_count, &payloads);
        let deliveries = cluster.run_to_quiescence();

        let mut by_slot: HashMap<u64, Vec<u8>> = HashMap::new();
        for (_, delivered) in &deliveries {
            match by_slot.get(&delivered.slot) {
                Some(existing) => prop_assert_eq!(existing, &delivered.payload, "two shards disagreed at the same slot"),
                None => { by_slot.insert(delivered.slot, delivered.payload.clone()); }
            }
        }
    }

    /// Replaying `Recruit`/`Accept`/`Learn` traffic for a slot that has
    /// already decided must never cause a second `on_decided` firing for
    /// that slot on the shard that saw it the first time.
    #[test]
    fn p4_idempotent_redelivery(
        shard_count in 3usize..6,
        payloads in prop::collection::vec((0usize..6, prop::collection::vec(any::<u8>(), 0..8)), 1..4),
    ) {
        let mut cluster = run_concurrent_sends(shard_count, &payloads);
        let first_pass = cluster.run_to_quiescence();
        let mut first_counts: HashMap<(usize, u64), usize> = HashMap::new();
        for (shard, delivered) in &first_pass {
            *first_counts.entry((*shard, delivered.slot)).or_insert(0) += 1;
        }
        for count in first_counts.values() {
            prop_assert_eq!(*count, 1, "a slot delivered more than once on the same shard in a single pass");
        }

        // Replay every already-decided instance's Learn message straight
        // back into its own shard.
        for shard in 0..cluster.ids.len() {
            let decided: Vec<_> = cluster.logs[shard]
                .instances()
                .filter(|(_, instance)| instance.is_decided())
                .map(|(slot, instance)| (slot, instance.learned_value().unwrap().clone()))
                .collect();
            for (slot, value) in decided {
                let message = paxos_core::message::Message::Learn {
                    log: cluster.logs[shard].name().clone(),
                    slot,
                    proposal: 1 << 30,
                    value,
                };
                let redelivered = cluster.logs[shard]
                    .on_receive(&cluster.transports[shard], cluster.ids[shard], message)
                    .unwrap();
                prop_assert!(redelivered.is_empty(), "a replayed Learn must never re-fire delivery");
            }
        }
    }
}
