//! Transactions and the per-round admission fee tally.

use crate::encoding::{
    read_bytes_u16, read_u32, read_u64, read_u8, write_bytes_u16, CodecError, Decode, Encode,
};
use crate::hash::{Hash, ScriptHash};
use crate::witness::Witness;
use bytes::{Buf, BufMut};
use std::collections::HashMap;

/// A transfer of value or invocation of a script, as carried in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Format version; currently always 0.
    pub version: u8,
    /// Sender-chosen uniqueness nonce.
    pub nonce: u32,
    /// Fee paid for execution.
    pub system_fee: u64,
    /// Fee paid for inclusion and witness verification.
    pub network_fee: u64,
    /// Last block index at which this transaction may be included.
    pub valid_until_block: u32,
    /// Account paying the fees.
    pub sender: ScriptHash,
    /// Invocation payload.
    pub script: Vec<u8>,
    /// Sender authentication; absent only on partially built transactions.
    pub witness: Option<Witness>,
}

impl Transaction {
    /// The transaction hash: double SHA-256 of the unsigned encoding.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::new();
        self.write_unsigned(&mut buf);
        Hash::digest(&buf)
    }

    /// Fees counted against the sender for admission.
    pub fn total_fees(&self) -> u64 {
        self.system_fee.saturating_add(self.network_fee)
    }

    fn write_unsigned<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.version);
        buf.put_u32_le(self.nonce);
        buf.put_u64_le(self.system_fee);
        buf.put_u64_le(self.network_fee);
        buf.put_u32_le(self.valid_until_block);
        self.sender.write(buf);
        write_bytes_u16(&self.script, buf);
    }
}

impl Encode for Transaction {
    fn write<B: BufMut>(&self, buf: &mut B) {
        self.write_unsigned(buf);
        match &self.witness {
            Some(witness) => {
                buf.put_u8(1);
                witness.write(buf);
            }
            None => buf.put_u8(0),
        }
    }
}

impl Decode for Transaction {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let version = read_u8(buf)?;
        let nonce = read_u32(buf)?;
        let system_fee = read_u64(buf)?;
        let network_fee = read_u64(buf)?;
        let valid_until_block = read_u32(buf)?;
        let sender = ScriptHash::read(buf)?;
        let script = read_bytes_u16(buf)?;
        let witness = match read_u8(buf)? {
            0 => None,
            1 => Some(Witness::read(buf)?),
            _ => return Err(CodecError::InvalidValue("witness flag")),
        };
        Ok(Transaction {
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            sender,
            script,
            witness,
        })
    }
}

/// Accumulated per-sender fees for the transactions admitted to one
/// candidate proposal. Reset whenever the candidate's transaction list is
/// discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionVerificationContext {
    sender_fees: HashMap<ScriptHash, u64>,
}

impl TransactionVerificationContext {
    /// Fresh, empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Would admitting `tx` keep its sender's accumulated fees within
    /// `available` (the sender's spendable balance)?
    pub fn check(&self, tx: &Transaction, available: u64) -> bool {
        let accumulated = self.sender_fees.get(&tx.sender).copied().unwrap_or(0);
        accumulated.saturating_add(tx.total_fees()) <= available
    }

    /// Record `tx` as admitted, accumulating its fees against the sender.
    pub fn add(&mut self, tx: &Transaction) {
        let accumulated = self.sender_fees.entry(tx.sender).or_insert(0);
        *accumulated = accumulated.saturating_add(tx.total_fees());
    }

    /// Accumulated fees for `sender`.
    pub fn fees_of(&self, sender: &ScriptHash) -> u64 {
        self.sender_fees.get(sender).copied().unwrap_or(0)
    }

    /// Drop all accumulated state.
    pub fn reset(&mut self) {
        self.sender_fees.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(nonce: u32, sender: u8, fee: u64) -> Transaction {
        Transaction {
            version: 0,
            nonce,
            system_fee: fee,
            network_fee: 1,
            valid_until_block: 100,
            sender: ScriptHash::new([sender; 20]),
            script: vec![0x41],
            witness: None,
        }
    }

    #[test]
    fn test_hash_ignores_witness() {
        let mut a = tx(1, 1, 5);
        let b = a.clone();
        a.witness = Some(Witness::default());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_covers_fields() {
        assert_ne!(tx(1, 1, 5).hash(), tx(2, 1, 5).hash());
    }

    #[test]
    fn test_codec_round_trip() {
        let mut original = tx(9, 3, 40);
        original.witness = Some(Witness {
            invocation_script: vec![1],
            verification_script: vec![2],
        });
        let decoded = Transaction::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_verification_context_accumulates() {
        let mut ctx = TransactionVerificationContext::new();
        let first = tx(1, 7, 10);
        let second = tx(2, 7, 10);

        assert!(ctx.check(&first, 15));
        ctx.add(&first);
        assert_eq!(ctx.fees_of(&first.sender), 11);

        // Second transaction from the same sender exceeds the balance.
        assert!(!ctx.check(&second, 15));
        assert!(ctx.check(&second, 30));

        ctx.reset();
        assert_eq!(ctx.fees_of(&first.sender), 0);
    }
}
