//! In-memory collaborator doubles for tests.

use crate::traits::{Ledger, Store, Wallet};
use dbft_types::{Block, BlockHeader, Hash, KeyPair, PublicKey};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug)]
struct LedgerState {
    index: u32,
    hash: Hash,
    headers: HashMap<Hash, BlockHeader>,
    validators: Vec<PublicKey>,
    computed_validators: Option<Vec<PublicKey>>,
    refresh_heights: Vec<u32>,
}

/// A chain tip that tests can advance by hand.
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// A ledger at genesis (index 0) with the given validator set.
    pub fn new(validators: Vec<PublicKey>) -> Self {
        MemoryLedger {
            state: Mutex::new(LedgerState {
                index: 0,
                hash: Hash::digest(b"genesis"),
                headers: HashMap::new(),
                validators,
                computed_validators: None,
                refresh_heights: Vec::new(),
            }),
        }
    }

    /// Move the tip to `index` with `hash`.
    pub fn advance(&self, index: u32, hash: Hash) {
        let mut state = self.state.lock().expect("ledger lock");
        state.index = index;
        state.hash = hash;
    }

    /// Record a header so `Ledger::header` can find it.
    pub fn insert_header(&self, header: BlockHeader) {
        let mut state = self.state.lock().expect("ledger lock");
        state.headers.insert(header.hash(), header);
    }

    /// Replace the validator set.
    pub fn set_validators(&self, validators: Vec<PublicKey>) {
        self.state.lock().expect("ledger lock").validators = validators;
    }

    /// Force the committee-refresh decision to apply at `height`.
    pub fn refresh_at(&self, height: u32) {
        self.state.lock().expect("ledger lock").refresh_heights.push(height);
    }

    /// Stake-tally result `compute_next_block_validators` should report.
    pub fn set_computed_validators(&self, validators: Vec<PublicKey>) {
        self.state.lock().expect("ledger lock").computed_validators = Some(validators);
    }
}

impl Ledger for MemoryLedger {
    fn current_index(&self) -> u32 {
        self.state.lock().expect("ledger lock").index
    }

    fn current_hash(&self) -> Hash {
        self.state.lock().expect("ledger lock").hash
    }

    fn header(&self, hash: &Hash) -> Option<BlockHeader> {
        self.state.lock().expect("ledger lock").headers.get(hash).cloned()
    }

    fn trimmed_block(&self, hash: &Hash) -> Option<Block> {
        let header = self.header(hash)?;
        Some(Block {
            header,
            transactions: vec![],
        })
    }

    fn next_block_validators(&self) -> Vec<PublicKey> {
        self.state.lock().expect("ledger lock").validators.clone()
    }

    fn compute_next_block_validators(&self) -> Vec<PublicKey> {
        let state = self.state.lock().expect("ledger lock");
        state
            .computed_validators
            .clone()
            .unwrap_or_else(|| state.validators.clone())
    }

    fn should_refresh_committee(&self, height: u32, _committee_size: usize) -> bool {
        self.state
            .lock()
            .expect("ledger lock")
            .refresh_heights
            .contains(&height)
    }
}

/// A store backed by a hash map.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.lock().expect("store lock").get(key).cloned()
    }

    fn put_sync(&self, key: &[u8], value: &[u8]) {
        self.entries
            .lock()
            .expect("store lock")
            .insert(key.to_vec(), value.to_vec());
    }
}

/// A wallet holding a fixed list of key pairs.
pub struct TestWallet {
    keys: Vec<KeyPair>,
}

impl TestWallet {
    /// A wallet holding `keys`.
    pub fn new(keys: Vec<KeyPair>) -> Self {
        TestWallet { keys }
    }

    /// A wallet holding no keys (a watch-only node).
    pub fn empty() -> Self {
        TestWallet { keys: Vec::new() }
    }
}

impl Wallet for TestWallet {
    fn key_for(&self, public_key: &PublicKey) -> Option<KeyPair> {
        self.keys
            .iter()
            .find(|pair| pair.public_key() == *public_key)
            .cloned()
    }
}
