//! Checkpoint round-trip and crash recovery scenarios.

mod common;

use common::{decode, Cluster};
use dbft::{Store, CHECKPOINT_KEY, PRIORITY};
use dbft_types::Hash;

/// The predicate surface of a context, for comparing a restored round
/// against the one that was checkpointed.
fn predicates(context: &dbft::ConsensusContext) -> (bool, bool, bool, bool, bool, usize, bool) {
    (
        context.request_sent_or_received(),
        context.response_sent(),
        context.commit_sent(),
        context.block_sent(),
        context.view_changing(),
        context.count_committed(),
        context.not_accepting_payloads_due_to_view_changing(),
    )
}

/// Build a mid-round state (preparations from two validators, a commit
/// from one), checkpoint it, and restore into a fresh context: every
/// predicate must come back identical, and re-serializing must reproduce
/// the blob byte for byte.
#[test]
fn test_checkpoint_round_trip_preserves_predicates() {
    let mut cluster = Cluster::new(4, 11);
    let primary = cluster.priority_primary();

    let request = cluster.contexts[primary]
        .make_prepare_request(PRIORITY, 4_000, 45, vec![])
        .expect("primary proposes");
    cluster.broadcast_prepare_request(primary, &request);

    let response = cluster.contexts[0]
        .make_prepare_response(PRIORITY)
        .expect("backup acknowledges");
    cluster.broadcast_prepare_response(0, &response);

    let commit = cluster.contexts[0]
        .make_commit(PRIORITY)
        .expect("commit signed");
    cluster.broadcast_commit(0, &commit);

    // Checkpoint validator 2's view of the round and restart it.
    cluster.contexts[2].save();
    let before = predicates(&cluster.contexts[2]);
    let blob = cluster.contexts[2].encode_state();

    let mut restarted = dbft::ConsensusContext::new(
        cluster.contexts[2].config().clone(),
        cluster.ledger.clone(),
        cluster.stores[2].clone(),
        std::sync::Arc::new(dbft::mocks::TestWallet::new(vec![cluster.pairs[2].clone()])),
    );
    assert!(restarted.load());

    assert_eq!(predicates(&restarted), before);
    assert_eq!(restarted.view_number(), cluster.contexts[2].view_number());
    assert_eq!(restarted.encode_state(), blob);

    // The restored round keeps working: the missing commits still finish it.
    for validator in [1usize, 3] {
        let commit = cluster.contexts[validator]
            .make_commit(PRIORITY)
            .expect("commit signed");
        assert!(restarted.record_commit(PRIORITY, commit.clone(), decode(&commit)));
    }
    let block = restarted.create_block(PRIORITY).expect("quorum reached");
    assert!(restarted.block_sent());
    assert_eq!(block.header.index, 1);
}

/// A checkpoint left behind by an earlier round is stale once the chain
/// tip advances: load reports failure and leaves the fresh round intact.
#[test]
fn test_stale_checkpoint_discarded() {
    let mut cluster = Cluster::new(4, 12);
    let primary = cluster.priority_primary();
    let request = cluster.contexts[primary]
        .make_prepare_request(PRIORITY, 5_000, 46, vec![])
        .expect("primary proposes");
    cluster.broadcast_prepare_request(primary, &request);
    cluster.contexts[2].save();

    // The chain advances past the checkpointed round.
    cluster.ledger.advance(1, Hash::digest(b"block 1"));

    assert!(!cluster.contexts[2].load());
    assert_eq!(cluster.contexts[2].block_index(), 2);
    assert_eq!(cluster.contexts[2].view_number(), 0);
    assert!(!cluster.contexts[2].request_sent_or_received());
}

/// Garbage under the checkpoint key is treated exactly like a stale
/// checkpoint.
#[test]
fn test_corrupt_checkpoint_discarded() {
    let cluster = Cluster::new(4, 13);
    cluster.stores[2].put_sync(&CHECKPOINT_KEY, &[0xde, 0xad, 0xbe, 0xef]);

    let mut restarted = dbft::ConsensusContext::new(
        cluster.contexts[2].config().clone(),
        cluster.ledger.clone(),
        cluster.stores[2].clone(),
        std::sync::Arc::new(dbft::mocks::TestWallet::new(vec![cluster.pairs[2].clone()])),
    );
    assert!(!restarted.load());
    assert!(!restarted.request_sent_or_received());
    assert_eq!(restarted.view_number(), 0);
}

/// A checkpoint taken in a later view restores that view and keeps the
/// fallback candidate torn down.
#[test]
fn test_checkpoint_preserves_view_number() {
    let mut cluster = Cluster::new(4, 14);
    for context in &mut cluster.contexts {
        context.reset(1);
    }
    cluster.contexts[2].save();

    assert!(cluster.contexts[2].load());
    assert_eq!(cluster.contexts[2].view_number(), 1);
    assert!(cluster.contexts[2].candidate(dbft::FALLBACK).is_none());
    assert!(cluster.contexts[2].candidate(PRIORITY).is_some());
}
