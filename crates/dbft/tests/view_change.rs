//! View-change scenarios: the safety valve, the fallback teardown, and a
//! full round in a later view.

mod common;

use common::{decode, Cluster};
use dbft::{FALLBACK, PRIORITY};
use dbft_messages::{ChangeViewReason, MessageKind};
use dbft_types::Decode;

/// A view-changing node stops accepting payloads only until more than F
/// nodes have committed or are lost, then must resume to avoid splitting
/// from late committers.
#[test]
fn test_safety_valve_across_nodes() {
    let mut cluster = Cluster::new(4, 21);
    let primary = cluster.priority_primary();

    let request = cluster.contexts[primary]
        .make_prepare_request(PRIORITY, 6_000, 47, vec![])
        .expect("primary proposes");
    cluster.broadcast_prepare_request(primary, &request);

    // Validator 3 gives up on the view.
    let change_view = cluster.contexts[3]
        .make_change_view(ChangeViewReason::Timeout, 6_500)
        .expect("change view signed");
    assert!(cluster.contexts[3].view_changing());
    assert!(cluster.contexts[3].not_accepting_payloads_due_to_view_changing());
    for index in 0..3 {
        let message = decode(&change_view);
        assert!(cluster.contexts[index].record_change_view(change_view.clone(), message));
        // Only the change-view's own sender is view-changing.
        assert!(!cluster.contexts[index].view_changing());
    }

    // Commits from two validators flip the safety valve on node 3.
    for validator in [0usize, 1] {
        let commit = cluster.contexts[validator]
            .make_commit(PRIORITY)
            .expect("commit signed");
        cluster.broadcast_commit(validator, &commit);
    }
    assert_eq!(cluster.contexts[3].count_committed(), 2);
    assert!(cluster.contexts[3].view_changing());
    assert!(!cluster.contexts[3].not_accepting_payloads_due_to_view_changing());
}

/// After the outer scheduler advances every node to view 1, the fallback
/// candidate is gone, the primary has rotated, and the round completes on
/// the priority candidate alone. Commits cast in view 0 do not count.
#[test]
fn test_round_completes_in_view_one() {
    let mut cluster = Cluster::new(4, 22);
    let primary = cluster.priority_primary();
    assert_eq!(primary, 1);

    // A commit in view 0 that will be carried across the transition.
    let request = cluster.contexts[primary]
        .make_prepare_request(PRIORITY, 7_000, 48, vec![])
        .expect("primary proposes");
    cluster.broadcast_prepare_request(primary, &request);
    let stale_commit = cluster.contexts[2]
        .make_commit(PRIORITY)
        .expect("commit signed in view 0");
    cluster.broadcast_commit(2, &stale_commit);

    for context in &mut cluster.contexts {
        context.reset(1);
        assert_eq!(context.view_number(), 1);
        assert!(context.candidate(FALLBACK).is_none());
        // The view-0 commit survives the transition...
        assert_eq!(context.count_committed(), 1);
    }

    // ...and the primary rotates to (H − V) mod N = 0.
    let new_primary = cluster.priority_primary();
    assert_eq!(new_primary, 0);

    cluster.run_priority_round(&[0, 1, 3], 8_000, 49);
    let block = cluster.contexts[0]
        .create_block(PRIORITY)
        .expect("three view-1 commits");

    // The stale view-0 commit contributed nothing: the witness holds
    // exactly the three view-1 signatures.
    let witness = block.header.witness.as_ref().expect("sealed block");
    let signatures = dbft_types::parse_invocation_script(&witness.invocation_script)
        .expect("well-formed invocation");
    assert_eq!(signatures.len(), 3);
    assert_eq!(block.header.primary_index, 0);
}

/// Without enough matching-view commits the builder keeps refusing, even
/// though older-view commits fill the slots.
#[test]
fn test_stale_commits_never_reach_quorum() {
    let mut cluster = Cluster::new(4, 23);
    let primary = cluster.priority_primary();
    let request = cluster.contexts[primary]
        .make_prepare_request(PRIORITY, 9_000, 50, vec![])
        .expect("primary proposes");
    cluster.broadcast_prepare_request(primary, &request);

    for validator in [1usize, 2, 3] {
        let commit = cluster.contexts[validator]
            .make_commit(PRIORITY)
            .expect("commit signed");
        cluster.broadcast_commit(validator, &commit);
    }

    // Node 0 moves to view 1; the three view-0 commits stay in their
    // slots but cannot seal a view-1 block.
    cluster.contexts[0].reset(1);
    assert_eq!(cluster.contexts[0].count_committed(), 3);
    assert_eq!(
        cluster.contexts[0].create_block(PRIORITY),
        Err(dbft::BuildError::HeaderIncomplete(PRIORITY))
    );
}

/// The recovery message repackages the round: change views, the proposal,
/// and every preparation and commit seen so far.
#[test]
fn test_recovery_message_assembly() {
    let mut cluster = Cluster::new(4, 24);
    let primary = cluster.priority_primary();

    let request = cluster.contexts[primary]
        .make_prepare_request(PRIORITY, 10_000, 51, vec![])
        .expect("primary proposes");
    cluster.broadcast_prepare_request(primary, &request);

    let response = cluster.contexts[0]
        .make_prepare_response(PRIORITY)
        .expect("backup acknowledges");
    cluster.broadcast_prepare_response(0, &response);

    let change_view = cluster.contexts[3]
        .make_change_view(ChangeViewReason::Timeout, 10_500)
        .expect("change view signed");
    for index in 0..3 {
        let message = decode(&change_view);
        cluster.contexts[index].record_change_view(change_view.clone(), message);
    }

    let commit = cluster.contexts[2]
        .make_commit(PRIORITY)
        .expect("commit signed");
    cluster.broadcast_commit(2, &commit);

    let payload = cluster.contexts[0]
        .make_recovery_message()
        .expect("recovery assembled");
    let message = dbft_messages::ConsensusMessage::from_bytes(&payload.data)
        .expect("payload decodes");
    let MessageKind::RecoveryMessage(recovery) = message.kind else {
        panic!("expected a recovery message");
    };

    assert_eq!(recovery.change_views.len(), 1);
    assert_eq!(recovery.change_views[0].validator_index, 3);
    let request_copy = recovery.prepare_requests[PRIORITY]
        .as_ref()
        .expect("proposal travels in full");
    assert_eq!(request_copy.nonce, 51);
    assert_eq!(recovery.preparations.len(), 1);
    assert_eq!(recovery.preparations[0].validator_index, 0);
    assert_eq!(recovery.commits.len(), 1);
    assert_eq!(recovery.commits[0].validator_index, 2);
    assert_eq!(recovery.commits[0].view_number, 0);
    // The request itself travels, so no bare preparation hash rides along.
    assert!(recovery.preparation_hashes[PRIORITY].is_none());
}
