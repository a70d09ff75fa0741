//! The extensible payload envelope carrying consensus messages on the wire.

use crate::encoding::{
    read_bytes_u32, read_bytes_u8, read_u32, read_u8, write_bytes_u32, write_bytes_u8, CodecError,
    Decode, Encode,
};
use crate::hash::{Hash, ScriptHash};
use crate::witness::Witness;
use bytes::{Buf, BufMut};

/// Payload category tag for consensus traffic.
pub const CONSENSUS_CATEGORY: &str = "dBFT";

/// Largest admissible inner message, in bytes.
pub const MAX_PAYLOAD_DATA: usize = 4 * 1024 * 1024;

/// Envelope for a consensus message: category tag, validity window, sender
/// address, opaque message bytes, and the sender's witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensiblePayload {
    /// Routing category; [`CONSENSUS_CATEGORY`] for consensus traffic.
    pub category: String,
    /// First block index at which the payload is valid.
    pub valid_block_start: u32,
    /// Last block index at which the payload is valid.
    pub valid_block_end: u32,
    /// Address of the sending validator.
    pub sender: ScriptHash,
    /// Encoded inner message.
    pub data: Vec<u8>,
    /// Sender authentication; absent while under construction.
    pub witness: Option<Witness>,
}

impl ExtensiblePayload {
    /// The payload hash: double SHA-256 of the unsigned encoding.
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::new();
        self.write_unsigned(&mut buf);
        Hash::digest(&buf)
    }

    fn write_unsigned<B: BufMut>(&self, buf: &mut B) {
        write_bytes_u8(self.category.as_bytes(), buf);
        buf.put_u32_le(self.valid_block_start);
        buf.put_u32_le(self.valid_block_end);
        self.sender.write(buf);
        write_bytes_u32(&self.data, buf);
    }
}

impl Encode for ExtensiblePayload {
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

impl Decode for ExtensiblePayload {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let category = String::from_utf8(read_bytes_u8(buf)?)
            .map_err(|_| CodecError::InvalidValue("category is not utf-8"))?;
        let valid_block_start = read_u32(buf)?;
        let valid_block_end = read_u32(buf)?;
        let sender = ScriptHash::read(buf)?;
        let data = read_bytes_u32(buf, MAX_PAYLOAD_DATA)?;
        let witness = match read_u8(buf)? {
            0 => None,
            1 => Some(Witness::read(buf)?),
            _ => return Err(CodecError::InvalidValue("witness flag")),
        };
        Ok(ExtensiblePayload {
            category,
            valid_block_start,
            valid_block_end,
            sender,
            data,
            witness,
        })
    }
}
