//! The consensus context: authoritative state of one block-production round.
//!
//! The context is mutated only by the protocol driver and never by I/O
//! callbacks; every operation is synchronous and total on valid inputs.
//! Predicates are pure reads over the state below. The context has no
//! timers of its own; the outer scheduler decides when to call
//! [`ConsensusContext::reset`] with the next view.

use crate::candidate::{CandidateBlock, FALLBACK, PRIORITY};
use crate::config::DbftConfig;
use crate::liveness::LivenessTracker;
use crate::traits::{Ledger, Store, Wallet};
use crate::validators::ValidatorSetView;
use dbft_messages::{
    ChangeView, ChangeViewCompact, ChangeViewReason, Commit, CommitCompact, ConsensusMessage,
    MessageKind, PreCommit, PreCommitCompact, PrepareRequest, PrepareResponse, PreparationCompact,
    RecoveryMessage, RecoveryRequest,
};
use dbft_types::{
    network_signing_data, push_signature, signature_redeem_script, BlockHeader, Decode, Encode,
    ExtensiblePayload, Hash, KeyPair, PublicKey, ScriptHash, Transaction, Witness,
    CONSENSUS_CATEGORY,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owned snapshot of the chain tip, refreshed at every view-0 reset and
/// held until the next one. Replacing it releases the previous snapshot on
/// every exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSnapshot {
    /// Index of the tip block.
    pub index: u32,
    /// Hash of the tip block.
    pub hash: Hash,
}

/// In-memory state machine for one round of dBFT block production.
pub struct ConsensusContext {
    pub(crate) config: DbftConfig,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) wallet: Arc<dyn Wallet>,

    // ═══════════════════════════════════════════════════════════════════════
    // Round State
    // ═══════════════════════════════════════════════════════════════════════
    pub(crate) snapshot: ChainSnapshot,
    pub(crate) validators: ValidatorSetView,
    pub(crate) my_index: Option<u8>,
    pub(crate) key_pair: Option<KeyPair>,
    pub(crate) view_number: u8,
    /// The two candidate proposals: `[PRIORITY, FALLBACK]`. The fallback
    /// exists only while the view is 0.
    pub(crate) candidates: [Option<CandidateBlock>; 2],
    /// Latest change-view payload per validator, for the current view.
    pub(crate) change_view_payloads: Vec<Option<ExtensiblePayload>>,
    /// Change-view payloads carried forward from the previous view, kept
    /// to justify recovery messages.
    pub(crate) last_change_view_payloads: Vec<Option<ExtensiblePayload>>,
    pub(crate) liveness: LivenessTracker,
    /// Decoding memo from payload hash to message; losing it is harmless.
    pub(crate) cached_messages: HashMap<Hash, ConsensusMessage>,
    /// Upper-bound serialized size of the block witness for the current
    /// validator set; recomputed when the set size changes.
    pub(crate) witness_size: usize,
}

impl ConsensusContext {
    /// Create a context over the collaborators and run the initial
    /// view-0 reset.
    pub fn new(
        config: DbftConfig,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn Store>,
        wallet: Arc<dyn Wallet>,
    ) -> Self {
        let mut context = ConsensusContext {
            config,
            ledger,
            store,
            wallet,
            snapshot: ChainSnapshot {
                index: 0,
                hash: Hash::ZERO,
            },
            validators: ValidatorSetView::empty(),
            my_index: None,
            key_pair: None,
            view_number: 0,
            candidates: [None, None],
            change_view_payloads: Vec::new(),
            last_change_view_payloads: Vec::new(),
            liveness: LivenessTracker::new(),
            cached_messages: HashMap::new(),
            witness_size: 0,
        };
        context.reset(0);
        context
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// The active configuration.
    pub fn config(&self) -> &DbftConfig {
        &self.config
    }

    /// The chain snapshot this round builds on.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.snapshot
    }

    /// The validator set for the round.
    pub fn validators(&self) -> &ValidatorSetView {
        &self.validators
    }

    /// Validator count.
    pub fn n(&self) -> usize {
        self.validators.n()
    }

    /// Tolerated fault count, `(N − 1) / 3`.
    pub fn f(&self) -> usize {
        self.validators.f()
    }

    /// Commit quorum, `N − F`.
    pub fn m(&self) -> usize {
        self.validators.m()
    }

    /// Our index in the validator list, `None` when watch-only.
    pub fn my_index(&self) -> Option<u8> {
        self.my_index
    }

    /// The current view.
    pub fn view_number(&self) -> u8 {
        self.view_number
    }

    /// Index of the block this round is producing.
    pub fn block_index(&self) -> u32 {
        match &self.candidates[PRIORITY] {
            Some(candidate) => candidate.header.index,
            None => self.snapshot.index + 1,
        }
    }

    /// The candidate at `index`, when it exists.
    pub fn candidate(&self, index: usize) -> Option<&CandidateBlock> {
        self.candidates.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn candidate_mut(&mut self, index: usize) -> Option<&mut CandidateBlock> {
        self.candidates.get_mut(index).and_then(Option::as_mut)
    }

    /// Upper-bound serialized size of the block witness, for fee
    /// estimation by outer layers.
    pub fn witness_size(&self) -> usize {
        self.witness_size
    }

    /// The cached decode of the payload with `hash`, if any.
    pub fn cached_message(&self, hash: &Hash) -> Option<&ConsensusMessage> {
        self.cached_messages.get(hash)
    }

    /// Height of the most recent message seen from `validator`.
    pub fn last_seen(&self, validator: &PublicKey) -> Option<u32> {
        self.liveness.get(validator)
    }

    /// Decode a slot payload, consulting the message cache first. Pure:
    /// a cache miss decodes without memoizing.
    pub(crate) fn payload_message(&self, payload: &ExtensiblePayload) -> Option<ConsensusMessage> {
        if let Some(message) = self.cached_messages.get(&payload.hash()) {
            return Some(message.clone());
        }
        ConsensusMessage::from_bytes(&payload.data).ok()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Primary Election
    // ═══════════════════════════════════════════════════════════════════════

    /// Index of the priority primary at `view`: `(H − V) mod N`.
    pub fn priority_primary_index(&self, view: u8) -> u8 {
        let n = self.validators.n() as i64;
        if n == 0 {
            return 0;
        }
        ((self.block_index() as i64 - view as i64).rem_euclid(n)) as u8
    }

    /// Index of the fallback primary, `(H − V − 1) mod N`. Meaningful only
    /// while the view is 0.
    pub fn fallback_primary_index(&self) -> Option<u8> {
        if self.view_number != 0 {
            return None;
        }
        let n = self.validators.n() as i64;
        if n == 0 {
            return None;
        }
        Some(((self.block_index() as i64 - 1).rem_euclid(n)) as u8)
    }

    /// The primary whose preparation slot announces a proposal for
    /// `candidate`.
    pub(crate) fn candidate_primary_index(&self, candidate: usize) -> Option<u8> {
        match candidate {
            PRIORITY => Some(self.priority_primary_index(self.view_number)),
            FALLBACK if self.candidates[FALLBACK].is_some() => self.fallback_primary_index(),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Derived Predicates
    // ═══════════════════════════════════════════════════════════════════════

    /// Are we the priority primary of the current view?
    pub fn is_priority_primary(&self) -> bool {
        self.my_index == Some(self.priority_primary_index(self.view_number))
    }

    /// Are we the fallback primary? Only ever true in view 0.
    pub fn is_fallback_primary(&self) -> bool {
        self.my_index.is_some() && self.my_index == self.fallback_primary_index()
    }

    /// Are we either primary?
    pub fn is_primary(&self) -> bool {
        self.is_priority_primary() || self.is_fallback_primary()
    }

    /// A backup is a validator that is not the priority primary but *is*
    /// the fallback primary; all other non-primaries are plain validators.
    pub fn is_backup(&self) -> bool {
        self.my_index.is_some() && !self.is_priority_primary() && self.is_fallback_primary()
    }

    /// Do we lack a validator seat this round?
    pub fn watch_only(&self) -> bool {
        self.my_index.is_none()
    }

    /// Has a proposal been sent or received for either candidate?
    pub fn request_sent_or_received(&self) -> bool {
        [PRIORITY, FALLBACK].iter().any(|&candidate| {
            match (self.candidate(candidate), self.candidate_primary_index(candidate)) {
                (Some(state), Some(primary)) => state.preparations[primary as usize].is_some(),
                _ => false,
            }
        })
    }

    /// Have we sent a preparation for either candidate?
    pub fn response_sent(&self) -> bool {
        let Some(my_index) = self.my_index else {
            return false;
        };
        self.candidates
            .iter()
            .flatten()
            .any(|candidate| candidate.preparations[my_index as usize].is_some())
    }

    /// Have we sent a commit for either candidate?
    pub fn commit_sent(&self) -> bool {
        let Some(my_index) = self.my_index else {
            return false;
        };
        self.candidates
            .iter()
            .flatten()
            .any(|candidate| candidate.commits[my_index as usize].is_some())
    }

    /// Has a block been assembled this round? Terminal.
    pub fn block_sent(&self) -> bool {
        self.candidates
            .iter()
            .flatten()
            .any(|candidate| candidate.block_transactions.is_some())
    }

    /// Are we asking to leave the current view?
    pub fn view_changing(&self) -> bool {
        let Some(my_index) = self.my_index else {
            return false;
        };
        let Some(payload) = self
            .change_view_payloads
            .get(my_index as usize)
            .and_then(Option::as_ref)
        else {
            return false;
        };
        let Some(message) = self.payload_message(payload) else {
            return false;
        };
        message
            .new_view_number()
            .is_some_and(|new_view| new_view > self.view_number)
    }

    /// Number of validators with a commit slot filled for either candidate.
    pub fn count_committed(&self) -> usize {
        (0..self.validators.n())
            .filter(|&index| {
                self.candidates
                    .iter()
                    .flatten()
                    .any(|candidate| candidate.commits[index].is_some())
            })
            .count()
    }

    /// Number of validators considered failed for this round.
    pub fn count_failed(&self) -> usize {
        self.liveness
            .count_failed(self.validators.keys(), self.block_index())
    }

    /// Have more than F validators committed or gone silent?
    pub fn more_than_f_nodes_committed_or_lost(&self) -> bool {
        self.count_committed() + self.count_failed() > self.validators.f()
    }

    /// The safety valve: a view-changing node keeps accepting payloads
    /// once more than F nodes have committed or are lost, so that late
    /// committers and view-changers cannot split into different views.
    pub fn not_accepting_payloads_due_to_view_changing(&self) -> bool {
        self.view_changing() && !self.more_than_f_nodes_committed_or_lost()
    }

    /// Did the validator set change at the tip, i.e. does the tip block
    /// carry a different `next_consensus` than its parent? Used only to
    /// decide whether the liveness tracker is rebuilt.
    pub fn validators_changed(&self) -> bool {
        Self::validators_changed_at(self.ledger.as_ref(), &self.snapshot)
    }

    fn validators_changed_at(ledger: &dyn Ledger, snapshot: &ChainSnapshot) -> bool {
        if snapshot.index == 0 {
            return false;
        }
        let Some(current) = ledger.trimmed_block(&snapshot.hash) else {
            return false;
        };
        let Some(previous) = ledger.trimmed_block(&current.header.prev_hash) else {
            return false;
        };
        current.header.next_consensus != previous.header.next_consensus
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Payload Ingestion
    // ═══════════════════════════════════════════════════════════════════════

    /// Common bookkeeping for any sent or received payload: memoize the
    /// decode and stamp the liveness tracker. Returns the sender index, or
    /// `None` for a sender outside the validator set.
    fn observe(&mut self, payload: &ExtensiblePayload, message: ConsensusMessage) -> Option<u8> {
        let index = message.validator_index;
        let Some(sender) = self.validators.key(index) else {
            warn!(
                validator_index = index,
                message = message.kind.type_name(),
                "Payload from unknown validator index"
            );
            return None;
        };
        self.liveness.note(sender, message.block_index);
        self.cached_messages.insert(payload.hash(), message);
        Some(index)
    }

    /// Record a payload that occupies no slot (recovery traffic), still
    /// feeding the cache and the liveness tracker.
    pub fn note_message(&mut self, payload: &ExtensiblePayload, message: ConsensusMessage) -> bool {
        self.observe(payload, message).is_some()
    }

    /// Record a proposal for `candidate`. The sender must be that
    /// candidate's primary.
    pub fn record_prepare_request(
        &mut self,
        candidate: usize,
        payload: ExtensiblePayload,
        message: ConsensusMessage,
    ) -> bool {
        let MessageKind::PrepareRequest(request) = &message.kind else {
            warn!(message = message.kind.type_name(), "Expected a prepare request");
            return false;
        };
        let Some(primary) = self.candidate_primary_index(candidate) else {
            warn!(candidate, "Proposal for a disabled candidate");
            return false;
        };
        if message.validator_index != primary {
            warn!(
                candidate,
                validator_index = message.validator_index,
                expected = primary,
                "Proposal from a non-primary"
            );
            return false;
        }
        let request = request.clone();
        let Some(index) = self.observe(&payload, message) else {
            return false;
        };
        let Some(state) = self.candidate_mut(candidate) else {
            return false;
        };
        state.apply_proposal(request.timestamp, request.nonce, request.transaction_hashes);
        state.preparations[index as usize] = Some(payload);
        debug!(candidate, primary = index, "Recorded prepare request");
        true
    }

    /// Record a preparation for `candidate` from a backup validator.
    pub fn record_prepare_response(
        &mut self,
        candidate: usize,
        payload: ExtensiblePayload,
        message: ConsensusMessage,
    ) -> bool {
        if !matches!(message.kind, MessageKind::PrepareResponse(_)) {
            warn!(message = message.kind.type_name(), "Expected a prepare response");
            return false;
        }
        let Some(index) = self.observe(&payload, message) else {
            return false;
        };
        let Some(state) = self.candidate_mut(candidate) else {
            warn!(candidate, "Preparation for a disabled candidate");
            return false;
        };
        state.preparations[index as usize] = Some(payload);
        true
    }

    /// Record a pre-commit for `candidate`.
    pub fn record_pre_commit(
        &mut self,
        candidate: usize,
        payload: ExtensiblePayload,
        message: ConsensusMessage,
    ) -> bool {
        if !matches!(message.kind, MessageKind::PreCommit(_)) {
            warn!(message = message.kind.type_name(), "Expected a pre-commit");
            return false;
        }
        let Some(index) = self.observe(&payload, message) else {
            return false;
        };
        let Some(state) = self.candidate_mut(candidate) else {
            warn!(candidate, "Pre-commit for a disabled candidate");
            return false;
        };
        state.pre_commits[index as usize] = Some(payload);
        true
    }

    /// Record a commit for `candidate`. Commits from any view are stored;
    /// the block builder skips those whose embedded view does not match
    /// the round's.
    pub fn record_commit(
        &mut self,
        candidate: usize,
        payload: ExtensiblePayload,
        message: ConsensusMessage,
    ) -> bool {
        if !matches!(message.kind, MessageKind::Commit(_)) {
            warn!(message = message.kind.type_name(), "Expected a commit");
            return false;
        }
        let Some(index) = self.observe(&payload, message) else {
            return false;
        };
        let Some(state) = self.candidate_mut(candidate) else {
            warn!(candidate, "Commit for a disabled candidate");
            return false;
        };
        state.commits[index as usize] = Some(payload);
        debug!(candidate, validator = index, "Recorded commit");
        true
    }

    /// Record a change view. The latest payload per validator wins.
    pub fn record_change_view(
        &mut self,
        payload: ExtensiblePayload,
        message: ConsensusMessage,
    ) -> bool {
        if !matches!(message.kind, MessageKind::ChangeView(_)) {
            warn!(message = message.kind.type_name(), "Expected a change view");
            return false;
        }
        let Some(index) = self.observe(&payload, message) else {
            return false;
        };
        self.change_view_payloads[index as usize] = Some(payload);
        true
    }

    /// Gather a proposed transaction for `candidate`. Returns true when
    /// the transaction was admitted into the candidate's map.
    pub fn add_transaction(&mut self, candidate: usize, transaction: Transaction) -> bool {
        let Some(state) = self.candidate_mut(candidate) else {
            return false;
        };
        let hash = transaction.hash();
        let proposed = state
            .transaction_hashes
            .as_ref()
            .is_some_and(|hashes| hashes.contains(&hash));
        if !proposed || state.transactions.contains_key(&hash) {
            return false;
        }
        state.verification_context.add(&transaction);
        state.transactions.insert(hash, transaction);
        true
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Payload Construction
    // ═══════════════════════════════════════════════════════════════════════

    /// Build, sign, memoize, and liveness-stamp a payload for `kind`.
    /// `None` when watch-only.
    fn make_signed_payload(&mut self, kind: MessageKind) -> Option<ExtensiblePayload> {
        let my_index = self.my_index?;
        let key_pair = self.key_pair.clone()?;
        let block_index = self.block_index();
        let message = ConsensusMessage {
            block_index,
            validator_index: my_index,
            view_number: self.view_number,
            kind,
        };
        let verification_script = signature_redeem_script(&key_pair.public_key());
        let mut payload = ExtensiblePayload {
            category: CONSENSUS_CATEGORY.to_string(),
            valid_block_start: 0,
            valid_block_end: block_index,
            sender: ScriptHash::of_script(&verification_script),
            data: message.to_bytes(),
            witness: None,
        };
        let signature =
            key_pair.sign(&network_signing_data(self.config.network, &payload.hash()));
        let mut invocation_script = Vec::new();
        push_signature(&mut invocation_script, &signature);
        payload.witness = Some(Witness {
            invocation_script,
            verification_script,
        });
        self.observe(&payload, message)?;
        Some(payload)
    }

    /// Propose a block on `candidate`: fill the proposal fields, sign a
    /// prepare request, and occupy our own preparation slot. We must be
    /// that candidate's primary.
    pub fn make_prepare_request(
        &mut self,
        candidate: usize,
        timestamp: u64,
        nonce: u64,
        transactions: Vec<Transaction>,
    ) -> Option<ExtensiblePayload> {
        let my_index = self.my_index?;
        if self.candidate_primary_index(candidate) != Some(my_index) {
            warn!(candidate, "Refusing to propose: not this candidate's primary");
            return None;
        }
        let hashes: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();
        let (version, prev_hash) = {
            let state = self.candidate_mut(candidate)?;
            state.apply_proposal(timestamp, nonce, hashes.clone());
            for transaction in transactions {
                state.verification_context.add(&transaction);
                state.transactions.insert(transaction.hash(), transaction);
            }
            (state.header.version, state.header.prev_hash)
        };
        let payload = self.make_signed_payload(MessageKind::PrepareRequest(PrepareRequest {
            version,
            prev_hash,
            timestamp,
            nonce,
            transaction_hashes: hashes,
        }))?;
        let state = self.candidate_mut(candidate)?;
        state.preparations[my_index as usize] = Some(payload.clone());
        info!(candidate, block_index = self.block_index(), "Proposed block");
        Some(payload)
    }

    /// Acknowledge the proposal on `candidate` and occupy our own
    /// preparation slot. Requires the primary's request to be present.
    pub fn make_prepare_response(&mut self, candidate: usize) -> Option<ExtensiblePayload> {
        let my_index = self.my_index?;
        let primary = self.candidate_primary_index(candidate)?;
        let preparation_hash = self
            .candidate(candidate)?
            .preparations
            .get(primary as usize)?
            .as_ref()?
            .hash();
        let payload = self.make_signed_payload(MessageKind::PrepareResponse(PrepareResponse {
            preparation_hash,
        }))?;
        let state = self.candidate_mut(candidate)?;
        state.preparations[my_index as usize] = Some(payload.clone());
        Some(payload)
    }

    /// Announce a preparation quorum on `candidate` and occupy our own
    /// pre-commit slot.
    pub fn make_pre_commit(&mut self, candidate: usize) -> Option<ExtensiblePayload> {
        let my_index = self.my_index?;
        let primary = self.candidate_primary_index(candidate)?;
        let preparation_hash = self
            .candidate(candidate)?
            .preparations
            .get(primary as usize)?
            .as_ref()?
            .hash();
        let payload = self.make_signed_payload(MessageKind::PreCommit(PreCommit {
            preparation_hash,
        }))?;
        let state = self.candidate_mut(candidate)?;
        state.pre_commits[my_index as usize] = Some(payload.clone());
        Some(payload)
    }

    /// Sign the candidate block and occupy our own commit slot. Seals the
    /// candidate header first.
    pub fn make_commit(&mut self, candidate: usize) -> Option<ExtensiblePayload> {
        let my_index = self.my_index?;
        let key_pair = self.key_pair.clone()?;
        let block_hash = self.ensure_header(candidate)?.hash();
        let signature =
            key_pair.sign(&network_signing_data(self.config.network, &block_hash));
        let payload = self.make_signed_payload(MessageKind::Commit(Commit { signature }))?;
        let state = self.candidate_mut(candidate)?;
        state.commits[my_index as usize] = Some(payload.clone());
        info!(candidate, "Commit sent");
        Some(payload)
    }

    /// Ask to advance past the current view and occupy our own
    /// change-view slot.
    pub fn make_change_view(
        &mut self,
        reason: ChangeViewReason,
        timestamp: u64,
    ) -> Option<ExtensiblePayload> {
        let my_index = self.my_index?;
        let payload =
            self.make_signed_payload(MessageKind::ChangeView(ChangeView { timestamp, reason }))?;
        self.change_view_payloads[my_index as usize] = Some(payload.clone());
        info!(
            view = self.view_number,
            ?reason,
            "Requested view change"
        );
        Some(payload)
    }

    /// Ask peers to retransmit the round state.
    pub fn make_recovery_request(&mut self, timestamp: u64) -> Option<ExtensiblePayload> {
        self.make_signed_payload(MessageKind::RecoveryRequest(RecoveryRequest { timestamp }))
    }

    /// Repackage the round state for a peer that fell behind.
    pub fn make_recovery_message(&mut self) -> Option<ExtensiblePayload> {
        let mut recovery = RecoveryMessage::default();

        for index in 0..self.validators.n() {
            let slot = self.change_view_payloads[index]
                .as_ref()
                .or(self.last_change_view_payloads[index].as_ref());
            let Some(payload) = slot else {
                continue;
            };
            let Some(message) = self.payload_message(payload) else {
                continue;
            };
            let MessageKind::ChangeView(change_view) = &message.kind else {
                continue;
            };
            recovery.change_views.push(ChangeViewCompact {
                validator_index: message.validator_index,
                original_view_number: message.view_number,
                timestamp: change_view.timestamp,
                invocation_script: invocation_of(payload),
            });
        }

        for candidate in [PRIORITY, FALLBACK] {
            let Some(state) = self.candidate(candidate) else {
                continue;
            };
            let primary = self.candidate_primary_index(candidate);
            for (index, slot) in state.preparations.iter().enumerate() {
                let Some(payload) = slot else {
                    continue;
                };
                let Some(message) = self.payload_message(payload) else {
                    continue;
                };
                match message.kind {
                    MessageKind::PrepareRequest(request) if primary == Some(index as u8) => {
                        recovery.prepare_requests[candidate] = Some(request);
                    }
                    MessageKind::PrepareResponse(response) => {
                        if recovery.preparation_hashes[candidate].is_none() {
                            recovery.preparation_hashes[candidate] =
                                Some(response.preparation_hash);
                        }
                        recovery.preparations.push(PreparationCompact {
                            candidate: candidate as u8,
                            validator_index: index as u8,
                            invocation_script: invocation_of(payload),
                        });
                    }
                    _ => {}
                }
            }
            for (index, slot) in state.pre_commits.iter().enumerate() {
                let Some(payload) = slot else {
                    continue;
                };
                let Some(message) = self.payload_message(payload) else {
                    continue;
                };
                let MessageKind::PreCommit(pre_commit) = &message.kind else {
                    continue;
                };
                recovery.pre_commits.push(PreCommitCompact {
                    candidate: candidate as u8,
                    validator_index: index as u8,
                    preparation_hash: pre_commit.preparation_hash,
                    invocation_script: invocation_of(payload),
                });
            }
            for (index, slot) in state.commits.iter().enumerate() {
                let Some(payload) = slot else {
                    continue;
                };
                let Some(message) = self.payload_message(payload) else {
                    continue;
                };
                let MessageKind::Commit(commit) = &message.kind else {
                    continue;
                };
                recovery.commits.push(CommitCompact {
                    candidate: candidate as u8,
                    view_number: message.view_number,
                    validator_index: index as u8,
                    signature: commit.signature,
                    invocation_script: invocation_of(payload),
                });
            }
            // The asker matches responses against the request payload hash,
            // so drop the redundant per-candidate hash when the request
            // itself travels.
            if recovery.prepare_requests[candidate].is_some() {
                recovery.preparation_hashes[candidate] = None;
            }
        }

        self.make_signed_payload(MessageKind::RecoveryMessage(Box::new(recovery)))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Re-initialize for `view_number`. View 0 is a full reset against a
    /// fresh chain snapshot; higher views transition the existing round,
    /// tearing down the fallback candidate.
    pub fn reset(&mut self, view_number: u8) {
        if view_number == 0 {
            self.full_reset();
        } else {
            self.view_transition(view_number);
        }
        if let Some(my_index) = self.my_index {
            if let Some(own_key) = self.validators.key(my_index) {
                // We are about to act this round.
                self.liveness.note(own_key, self.block_index());
            }
        }
        debug!(
            view = self.view_number,
            block_index = self.block_index(),
            my_index = ?self.my_index,
            "Round reset"
        );
    }

    fn full_reset(&mut self) {
        let snapshot = ChainSnapshot {
            index: self.ledger.current_index(),
            hash: self.ledger.current_hash(),
        };
        let validators_changed = Self::validators_changed_at(self.ledger.as_ref(), &snapshot);
        let validators = ValidatorSetView::load(self.ledger.as_ref());
        let block_index = snapshot.index + 1;

        if validators.n() != self.config.validators_count {
            warn!(
                expected = self.config.validators_count,
                actual = validators.n(),
                "Validator count differs from configuration"
            );
        }
        if validators.n() != self.validators.n() {
            self.witness_size = crate::builder::estimated_witness_size(validators.keys());
        }

        let next_consensus = validators.next_consensus(
            self.ledger.as_ref(),
            block_index,
            self.config.committee_members_count,
        );

        self.liveness
            .rebuild(validators.keys(), snapshot.index, validators_changed);

        let n = validators.n();
        self.snapshot = snapshot;
        self.validators = validators;
        self.view_number = 0;
        self.change_view_payloads = vec![None; n];
        self.last_change_view_payloads = vec![None; n];
        self.cached_messages.clear();

        // First wallet match wins the validator seat.
        self.my_index = None;
        self.key_pair = None;
        for (index, key) in self.validators.keys().iter().enumerate() {
            if let Some(pair) = self.wallet.key_for(key) {
                self.my_index = Some(index as u8);
                self.key_pair = Some(pair);
                break;
            }
        }

        let prev_hash = self.snapshot.hash;
        let header = move |primary_index: u8| BlockHeader {
            version: 0,
            prev_hash,
            merkle_root: Hash::ZERO,
            timestamp: 0,
            nonce: 0,
            index: block_index,
            primary_index,
            next_consensus,
            witness: None,
        };
        let priority_primary = {
            let n = n as i64;
            if n == 0 {
                0
            } else {
                (block_index as i64).rem_euclid(n) as u8
            }
        };
        let fallback_primary = {
            let n = n as i64;
            if n == 0 {
                0
            } else {
                (block_index as i64 - 1).rem_euclid(n) as u8
            }
        };
        self.candidates = [
            Some(CandidateBlock::new(header(priority_primary), n)),
            Some(CandidateBlock::new(header(fallback_primary), n)),
        ];
    }

    fn view_transition(&mut self, view_number: u8) {
        // Carry forward change views that still justify this or a later
        // view; drop the rest.
        let carried: Vec<Option<ExtensiblePayload>> = (0..self.validators.n())
            .map(|index| {
                self.change_view_payloads[index].as_ref().and_then(|payload| {
                    let message = self.payload_message(payload)?;
                    let new_view = message.new_view_number()?;
                    (new_view >= view_number).then(|| payload.clone())
                })
            })
            .collect();
        self.last_change_view_payloads = carried;
        self.view_number = view_number;
        let primary_index = self.priority_primary_index(view_number);
        if let Some(state) = self.candidates[PRIORITY].as_mut() {
            state.partial_reset(primary_index);
        }
        // Dual proposals are a view-0 affair.
        self.candidates[FALLBACK] = None;
        info!(view = view_number, primary = primary_index, "View transition");
    }
}

/// The invocation script of a payload's witness, empty when unsigned.
fn invocation_of(payload: &ExtensiblePayload) -> Vec<u8> {
    payload
        .witness
        .as_ref()
        .map(|witness| witness.invocation_script.clone())
        .unwrap_or_default()
}

impl std::fmt::Debug for ConsensusContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusContext")
            .field("block_index", &self.block_index())
            .field("view_number", &self.view_number)
            .field("my_index", &self.my_index)
            .field("n", &self.validators.n())
            .field("count_committed", &self.count_committed())
            .field("count_failed", &self.count_failed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{FALLBACK, PRIORITY};
    use crate::testing::{
        commit_payload_from, four_validator_context, propose_empty, sign_envelope,
        watch_only_context,
    };
    use dbft_messages::PrepareRequest;

    #[test]
    fn test_quorum_arithmetic_cached() {
        let (context, _pairs) = four_validator_context(1);
        assert_eq!(context.n(), 4);
        assert_eq!(context.f(), 1);
        assert_eq!(context.m(), 3);
    }

    #[test]
    fn test_slot_widths_match_validator_count() {
        let (context, _pairs) = four_validator_context(1);
        for candidate in [PRIORITY, FALLBACK] {
            let state = context.candidate(candidate).unwrap();
            assert_eq!(state.preparations.len(), 4);
            assert_eq!(state.pre_commits.len(), 4);
            assert_eq!(state.commits.len(), 4);
        }
    }

    #[test]
    fn test_priority_primary_rotation_visits_every_index() {
        let (context, _pairs) = four_validator_context(1);
        let mut seen: Vec<u8> = (0..4)
            .map(|view| context.priority_primary_index(view))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_roles_at_genesis() {
        // Block index 1, N = 4: priority primary is (1 − 0) mod 4 = 1,
        // fallback primary (1 − 0 − 1) mod 4 = 0.
        let (primary, _pairs) = four_validator_context(1);
        assert!(primary.is_priority_primary());
        assert!(!primary.is_fallback_primary());
        assert!(!primary.is_backup());

        let (fallback, _pairs) = four_validator_context(0);
        assert!(!fallback.is_priority_primary());
        assert!(fallback.is_fallback_primary());
        assert!(fallback.is_backup());

        let (plain, _pairs) = four_validator_context(2);
        assert!(!plain.is_primary());
        assert!(!plain.is_backup());
        assert!(!plain.watch_only());
    }

    #[test]
    fn test_watch_only_has_no_role() {
        let (mut context, _pairs) = watch_only_context();
        assert!(context.watch_only());
        assert!(!context.is_primary());
        assert!(!context.response_sent());
        assert!(!context.commit_sent());
        assert!(!context.view_changing());
        assert!(context.make_prepare_request(PRIORITY, 0, 0, vec![]).is_none());
        assert!(context.make_commit(PRIORITY).is_none());
    }

    #[test]
    fn test_request_sent_or_received_tracks_primary_slot() {
        let (mut context, pairs) = four_validator_context(2);
        assert!(!context.request_sent_or_received());

        let prev_hash = context.candidate(PRIORITY).unwrap().header.prev_hash;
        let message = ConsensusMessage {
            block_index: context.block_index(),
            validator_index: 1,
            view_number: 0,
            kind: MessageKind::PrepareRequest(PrepareRequest {
                version: 0,
                prev_hash,
                timestamp: 500,
                nonce: 9,
                transaction_hashes: vec![],
            }),
        };
        let payload = sign_envelope(context.config().network, &pairs[1], message.clone());
        assert!(context.record_prepare_request(PRIORITY, payload, message));
        assert!(context.request_sent_or_received());
        assert_eq!(
            context.candidate(PRIORITY).unwrap().header.timestamp,
            500
        );
    }

    #[test]
    fn test_proposal_from_non_primary_rejected() {
        let (mut context, pairs) = four_validator_context(2);
        let message = ConsensusMessage {
            block_index: context.block_index(),
            validator_index: 3,
            view_number: 0,
            kind: MessageKind::PrepareRequest(PrepareRequest {
                version: 0,
                prev_hash: Hash::ZERO,
                timestamp: 1,
                nonce: 1,
                transaction_hashes: vec![],
            }),
        };
        let payload = sign_envelope(context.config().network, &pairs[3], message.clone());
        assert!(!context.record_prepare_request(PRIORITY, payload, message));
        assert!(!context.request_sent_or_received());
    }

    #[test]
    fn test_safety_valve_reopens_after_f_commits_or_losses() {
        let (mut context, pairs) = four_validator_context(2);
        context
            .make_change_view(ChangeViewReason::Timeout, 1_000)
            .unwrap();
        assert!(context.view_changing());
        assert!(context.not_accepting_payloads_due_to_view_changing());

        // Two commits arrive: committed (2) + failed (0) > F (1), so the
        // node must resume accepting payloads despite the pending change.
        for validator in [0usize, 1] {
            let (payload, message) = commit_payload_from(&context, &pairs, validator, 0);
            assert!(context.record_commit(PRIORITY, payload, message));
        }
        assert_eq!(context.count_committed(), 2);
        assert!(context.view_changing());
        assert!(!context.not_accepting_payloads_due_to_view_changing());
    }

    #[test]
    fn test_view_transition_drops_fallback() {
        let (mut context, pairs) = four_validator_context(1);
        propose_empty(&mut context, &pairs);
        assert!(context.candidate(FALLBACK).is_some());

        context.reset(1);

        assert_eq!(context.view_number(), 1);
        assert!(context.candidate(FALLBACK).is_none());
        let priority = context.candidate(PRIORITY).unwrap();
        assert!(priority.header.merkle_root.is_zero());
        assert_eq!(priority.header.timestamp, 0);
        assert!(priority.transaction_hashes.is_none());
        assert!(priority.preparations.iter().all(Option::is_none));
        // Primary rotates to (H − 1) mod N = 0.
        assert_eq!(priority.header.primary_index, 0);
        assert!(!context.is_priority_primary());
    }

    #[test]
    fn test_change_views_carry_forward_when_justifying() {
        let (mut context, _pairs) = four_validator_context(2);
        context
            .make_change_view(ChangeViewReason::Timeout, 7)
            .unwrap();

        context.reset(1);
        // Our change view proposed view 1 >= 1, so it is carried forward.
        assert!(context.last_change_view_payloads[2].is_some());
        // And with the view now matching, we are no longer view-changing.
        assert!(!context.view_changing());

        context.reset(2);
        // A change view to 1 cannot justify view 2; it is dropped.
        assert!(context.last_change_view_payloads[2].is_none());
    }

    #[test]
    fn test_own_liveness_stamped_at_reset() {
        let (context, pairs) = four_validator_context(1);
        assert_eq!(
            context.last_seen(&pairs[1].public_key()),
            Some(context.block_index())
        );
        // Peers start at the snapshot height, not the pending one.
        assert_eq!(context.last_seen(&pairs[0].public_key()), Some(0));
        assert_eq!(context.count_failed(), 0);
    }

    #[test]
    fn test_commit_before_block_ordering() {
        let (mut context, pairs) = four_validator_context(1);
        propose_empty(&mut context, &pairs);
        assert!(!context.commit_sent());
        assert!(!context.block_sent());

        context.make_commit(PRIORITY).unwrap();
        assert!(context.commit_sent());
        assert!(!context.block_sent());

        for validator in [0usize, 2] {
            let (payload, message) = commit_payload_from(&context, &pairs, validator, 0);
            context.record_commit(PRIORITY, payload, message);
        }
        context.create_block(PRIORITY).unwrap();
        assert!(context.block_sent());
    }
}
