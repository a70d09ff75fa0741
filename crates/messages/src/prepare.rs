//! Prepare-request and prepare-response messages.

use bytes::{Buf, BufMut};
use dbft_types::{
    read_list_u16, read_u32, read_u64, write_list_u16, CodecError, Decode, Encode, Hash,
};

/// A primary's block proposal: the header fields it controls plus the
/// ordered transaction hash list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    /// Block format version the proposal targets.
    pub version: u32,
    /// Hash of the chain tip the proposal builds on.
    pub prev_hash: Hash,
    /// Proposer-chosen timestamp, milliseconds since the epoch.
    pub timestamp: u64,
    /// Proposer-chosen random nonce.
    pub nonce: u64,
    /// Hashes of the proposed transactions, in merkle order.
    pub transaction_hashes: Vec<Hash>,
}

impl Encode for PrepareRequest {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.version);
        self.prev_hash.write(buf);
        buf.put_u64_le(self.timestamp);
        buf.put_u64_le(self.nonce);
        write_list_u16(&self.transaction_hashes, buf);
    }
}

impl Decode for PrepareRequest {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(PrepareRequest {
            version: read_u32(buf)?,
            prev_hash: Hash::read(buf)?,
            timestamp: read_u64(buf)?,
            nonce: read_u64(buf)?,
            transaction_hashes: read_list_u16(buf)?,
        })
    }
}

/// A backup's acknowledgement of a proposal, identified by the hash of the
/// prepare-request payload it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareResponse {
    /// Hash of the acknowledged prepare-request payload.
    pub preparation_hash: Hash,
}

impl Encode for PrepareResponse {
    fn write<B: BufMut>(&self, buf: &mut B) {
        self.preparation_hash.write(buf);
    }
}

impl Decode for PrepareResponse {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(PrepareResponse {
            preparation_hash: Hash::read(buf)?,
        })
    }
}
