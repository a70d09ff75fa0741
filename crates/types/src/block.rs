//! Block header and block.

use crate::encoding::{
    read_list_u16, read_u32, read_u64, read_u8, write_list_u16, CodecError, Decode, Encode,
};
use crate::hash::{Hash, ScriptHash};
use crate::transaction::Transaction;
use crate::witness::Witness;
use bytes::{Buf, BufMut};

/// Consensus metadata of a block. The witness is attached only once a
/// quorum of commit signatures has been assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Format version; currently always 0.
    pub version: u32,
    /// Hash of the preceding block.
    pub prev_hash: Hash,
    /// Merkle root over the transaction hash list; [`Hash::ZERO`] until
    /// the header is sealed.
    pub merkle_root: Hash,
    /// Proposer-chosen timestamp, milliseconds since the epoch.
    pub timestamp: u64,
    /// Proposer-chosen random nonce.
    pub nonce: u64,
    /// Chain position of this block.
    pub index: u32,
    /// Validator index of the proposer this header originated from.
    pub primary_index: u8,
    /// Address of the validator set expected to sign the next block.
    pub next_consensus: ScriptHash,
    /// Multi-signature witness over the header hash; absent on drafts.
    pub witness: Option<Witness>,
}

impl BlockHeader {
    /// The header hash: double SHA-256 of the unsigned encoding.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::new();
        self.write_unsigned(&mut buf);
        Hash::digest(&buf)
    }

    /// Append the unsigned (witness-free) encoding to `buf`.
    pub fn write_unsigned<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.version);
        self.prev_hash.write(buf);
        self.merkle_root.write(buf);
        buf.put_u64_le(self.timestamp);
        buf.put_u64_le(self.nonce);
        buf.put_u32_le(self.index);
        buf.put_u8(self.primary_index);
        self.next_consensus.write(buf);
    }
}

impl Encode for BlockHeader {
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

impl Decode for BlockHeader {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let version = read_u32(buf)?;
        let prev_hash = Hash::read(buf)?;
        let merkle_root = Hash::read(buf)?;
        let timestamp = read_u64(buf)?;
        let nonce = read_u64(buf)?;
        let index = read_u32(buf)?;
        let primary_index = read_u8(buf)?;
        let next_consensus = ScriptHash::read(buf)?;
        let witness = match read_u8(buf)? {
            0 => None,
            1 => Some(Witness::read(buf)?),
            _ => return Err(CodecError::InvalidValue("witness flag")),
        };
        Ok(BlockHeader {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            nonce,
            index,
            primary_index,
            next_consensus,
            witness,
        })
    }
}

/// A sealed header plus its transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Consensus metadata.
    pub header: BlockHeader,
    /// Transactions in merkle order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block hash (the header hash).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

impl Encode for Block {
    fn write<B: BufMut>(&self, buf: &mut B) {
        self.header.write(buf);
        write_list_u16(&self.transactions, buf);
    }
}

impl Decode for Block {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Block {
            header: BlockHeader::read(buf)?,
            transactions: read_list_u16(buf)?,
        })
    }
}
