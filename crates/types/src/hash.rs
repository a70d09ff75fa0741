//! Digest types: 32-byte object hashes and 20-byte script hashes.

use crate::encoding::{read_array, CodecError, Decode, Encode};
use bytes::{Buf, BufMut};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a hash from its hex form.
#[derive(Debug, Error, PartialEq)]
pub enum HexError {
    /// The string length did not match the digest width.
    #[error("expected {expected} hex characters, got {actual}")]
    BadLength { expected: usize, actual: usize },

    /// The string contained a non-hex character.
    #[error("invalid hex: {0}")]
    BadDigit(#[from] hex::FromHexError),
}

/// 32-byte object hash (double SHA-256 of the object's encoding).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zeros hash, used as the null sentinel.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Double SHA-256 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        Hash(Sha256::digest(first).into())
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True when this is the null sentinel.
    pub fn is_zero(&self) -> bool {
        *self == Hash::ZERO
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &hex::encode(self.0)[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Hash {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(HexError::BadLength {
                expected: 64,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Hash(bytes))
    }
}

impl Encode for Hash {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.0);
    }
}

impl Decode for Hash {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Hash(read_array::<32, _>(buf)?))
    }
}

/// 20-byte script hash, the address form of a verification script.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptHash([u8; 20]);

impl ScriptHash {
    /// The all-zeros script hash, used as the null sentinel.
    pub const ZERO: ScriptHash = ScriptHash([0u8; 20]);

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        ScriptHash(bytes)
    }

    /// Derive the address of a verification script: the leading 20 bytes of
    /// its double SHA-256 digest.
    pub fn of_script(script: &[u8]) -> Self {
        let digest = Hash::digest(script);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        ScriptHash(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// True when this is the null sentinel.
    pub fn is_zero(&self) -> bool {
        *self == ScriptHash::ZERO
    }
}

impl fmt::Debug for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptHash({})", &hex::encode(self.0)[..12])
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Encode for ScriptHash {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.0);
    }
}

impl Decode for ScriptHash {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(ScriptHash(read_array::<20, _>(buf)?))
    }
}
