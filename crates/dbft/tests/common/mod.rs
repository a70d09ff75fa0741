//! A four-validator cluster over a shared in-memory ledger.

use dbft::mocks::{MemoryLedger, MemoryStore, TestWallet};
use dbft::{ConsensusContext, DbftConfig, PRIORITY};
use dbft_messages::ConsensusMessage;
use dbft_types::{Decode, ExtensiblePayload, KeyPair};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// One consensus context per validator, all watching the same chain.
pub struct Cluster {
    pub contexts: Vec<ConsensusContext>,
    pub pairs: Vec<KeyPair>,
    pub ledger: Arc<MemoryLedger>,
    pub stores: Vec<Arc<MemoryStore>>,
}

impl Cluster {
    /// Spin up `n` validators at genesis with deterministic keys.
    pub fn new(n: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let pairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate(&mut rng)).collect();
        let publics = pairs.iter().map(KeyPair::public_key).collect();
        let ledger = Arc::new(MemoryLedger::new(publics));
        let mut contexts = Vec::with_capacity(n);
        let mut stores = Vec::with_capacity(n);
        for pair in &pairs {
            let store = Arc::new(MemoryStore::new());
            contexts.push(ConsensusContext::new(
                DbftConfig::default().with_validators_count(n),
                ledger.clone(),
                store.clone(),
                Arc::new(TestWallet::new(vec![pair.clone()])),
            ));
            stores.push(store);
        }
        Cluster {
            contexts,
            pairs,
            ledger,
            stores,
        }
    }

    /// The validator index acting as priority primary right now.
    pub fn priority_primary(&self) -> usize {
        let context = &self.contexts[0];
        context.priority_primary_index(context.view_number()) as usize
    }

    /// Deliver a proposal payload to every other validator.
    pub fn broadcast_prepare_request(&mut self, from: usize, payload: &ExtensiblePayload) {
        for (index, context) in self.contexts.iter_mut().enumerate() {
            if index != from {
                assert!(context.record_prepare_request(
                    PRIORITY,
                    payload.clone(),
                    decode(payload)
                ));
            }
        }
    }

    /// Deliver a preparation payload to every other validator.
    pub fn broadcast_prepare_response(&mut self, from: usize, payload: &ExtensiblePayload) {
        for (index, context) in self.contexts.iter_mut().enumerate() {
            if index != from {
                assert!(context.record_prepare_response(
                    PRIORITY,
                    payload.clone(),
                    decode(payload)
                ));
            }
        }
    }

    /// Deliver a pre-commit payload to every other validator.
    pub fn broadcast_pre_commit(&mut self, from: usize, payload: &ExtensiblePayload) {
        for (index, context) in self.contexts.iter_mut().enumerate() {
            if index != from {
                assert!(context.record_pre_commit(PRIORITY, payload.clone(), decode(payload)));
            }
        }
    }

    /// Deliver a commit payload to every other validator.
    pub fn broadcast_commit(&mut self, from: usize, payload: &ExtensiblePayload) {
        for (index, context) in self.contexts.iter_mut().enumerate() {
            if index != from {
                assert!(context.record_commit(PRIORITY, payload.clone(), decode(payload)));
            }
        }
    }

    /// Run the three protocol phases on the priority candidate with the
    /// given participants, leaving every participant ready to build.
    pub fn run_priority_round(&mut self, participants: &[usize], timestamp: u64, nonce: u64) {
        let primary = self.priority_primary();
        assert!(participants.contains(&primary));

        let request = self.contexts[primary]
            .make_prepare_request(PRIORITY, timestamp, nonce, vec![])
            .expect("primary proposes");
        self.broadcast_prepare_request(primary, &request);

        for &validator in participants {
            if validator == primary {
                continue;
            }
            let response = self.contexts[validator]
                .make_prepare_response(PRIORITY)
                .expect("backup acknowledges");
            self.broadcast_prepare_response(validator, &response);
        }

        for &validator in participants {
            let pre_commit = self.contexts[validator]
                .make_pre_commit(PRIORITY)
                .expect("preparation quorum observed");
            self.broadcast_pre_commit(validator, &pre_commit);
        }

        for &validator in participants {
            let commit = self.contexts[validator]
                .make_commit(PRIORITY)
                .expect("commit signed");
            self.broadcast_commit(validator, &commit);
        }
    }
}

/// Decode a payload's inner message the way the protocol driver would.
pub fn decode(payload: &ExtensiblePayload) -> ConsensusMessage {
    ConsensusMessage::from_bytes(&payload.data).expect("payload carries a consensus message")
}
