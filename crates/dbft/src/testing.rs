//! Shared fixtures for in-crate tests.

use crate::config::DbftConfig;
use crate::context::ConsensusContext;
use crate::mocks::{MemoryLedger, MemoryStore, TestWallet};
use dbft_messages::{Commit, ConsensusMessage, MessageKind};
use dbft_types::{
    merkle_root, network_signing_data, push_signature, signature_redeem_script, ExtensiblePayload,
    KeyPair, PublicKey, ScriptHash, Witness, CONSENSUS_CATEGORY,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// A context over four validators at genesis, holding the wallet key of
/// validator `wallet_member`. At block index 1 the priority primary is
/// validator 1 and the fallback primary validator 0.
pub fn four_validator_context(wallet_member: usize) -> (ConsensusContext, Vec<KeyPair>) {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let pairs: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate(&mut rng)).collect();
    let publics: Vec<PublicKey> = pairs.iter().map(KeyPair::public_key).collect();
    let ledger = Arc::new(MemoryLedger::new(publics));
    let store = Arc::new(MemoryStore::new());
    let wallet = Arc::new(TestWallet::new(vec![pairs[wallet_member].clone()]));
    let config = DbftConfig::default().with_validators_count(4);
    (
        ConsensusContext::new(config, ledger, store, wallet),
        pairs,
    )
}

/// A context over the same four validators but holding no wallet key.
pub fn watch_only_context() -> (ConsensusContext, Vec<KeyPair>) {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let pairs: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate(&mut rng)).collect();
    let publics: Vec<PublicKey> = pairs.iter().map(KeyPair::public_key).collect();
    let ledger = Arc::new(MemoryLedger::new(publics));
    let store = Arc::new(MemoryStore::new());
    let wallet = Arc::new(TestWallet::empty());
    let config = DbftConfig::default().with_validators_count(4);
    (
        ConsensusContext::new(config, ledger, store, wallet),
        pairs,
    )
}

/// Propose an empty block on the priority candidate. The context must be
/// the priority primary.
pub fn propose_empty(context: &mut ConsensusContext, _pairs: &[KeyPair]) {
    context
        .make_prepare_request(crate::candidate::PRIORITY, 1_000, 42, vec![])
        .expect("context is the priority primary");
}

/// Craft the commit payload validator `validator` would send for the
/// priority candidate, stamped with `view`.
pub fn commit_payload_from(
    context: &ConsensusContext,
    pairs: &[KeyPair],
    validator: usize,
    view: u8,
) -> (ExtensiblePayload, ConsensusMessage) {
    let block_hash = {
        let state = context.candidate(crate::candidate::PRIORITY).expect("candidate");
        let mut header = state.header.clone();
        if header.merkle_root.is_zero() {
            if let Some(hashes) = &state.transaction_hashes {
                header.merkle_root = merkle_root(hashes);
            }
        }
        header.hash()
    };
    let network = context.config().network;
    let pair = &pairs[validator];
    let signature = pair.sign(&network_signing_data(network, &block_hash));
    let message = ConsensusMessage {
        block_index: context.block_index(),
        validator_index: validator as u8,
        view_number: view,
        kind: MessageKind::Commit(Commit { signature }),
    };
    (sign_envelope(network, pair, message.clone()), message)
}

/// Wrap and witness-sign `message` the way its sender would.
pub fn sign_envelope(
    network: u32,
    pair: &KeyPair,
    message: ConsensusMessage,
) -> ExtensiblePayload {
    use dbft_types::Encode;

    let verification_script = signature_redeem_script(&pair.public_key());
    let mut payload = ExtensiblePayload {
        category: CONSENSUS_CATEGORY.to_string(),
        valid_block_start: 0,
        valid_block_end: message.block_index,
        sender: ScriptHash::of_script(&verification_script),
        data: message.to_bytes(),
        witness: None,
    };
    let signature = pair.sign(&network_signing_data(network, &payload.hash()));
    let mut invocation_script = Vec::new();
    push_signature(&mut invocation_script, &signature);
    payload.witness = Some(Witness {
        invocation_script,
        verification_script,
    });
    payload
}
