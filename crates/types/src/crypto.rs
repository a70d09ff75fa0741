//! Validator keys and signatures.
//!
//! Ed25519 throughout: 32-byte public keys, 64-byte signatures. Public keys
//! order lexicographically so a validator list has one canonical ordering.

use crate::encoding::{read_array, CodecError, Decode, Encode};
use crate::hash::Hash;
use bytes::{Buf, BufMut};
use ed25519_dalek::{Signer, Verifier};
use rand::{CryptoRng, RngCore};
use std::fmt;

/// A validator's 32-byte public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify `signature` over `message`. Returns false for malformed keys
    /// as well as bad signatures; the caller only cares about admissibility.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &hex::encode(self.0)[..12])
    }
}

impl Encode for PublicKey {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.0);
    }
}

impl Decode for PublicKey {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(PublicKey(read_array::<32, _>(buf)?))
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Byte width of every signature.
    pub const LEN: usize = 64;

    /// Wrap raw signature bytes.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Signature(bytes)
    }

    /// The all-zeros placeholder signature.
    pub const fn zero() -> Self {
        Signature([0u8; 64])
    }

    /// The raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &hex::encode(self.0)[..12])
    }
}

impl Encode for Signature {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.0);
    }
}

impl Decode for Signature {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Signature(read_array::<64, _>(buf)?))
    }
}

/// A signing key plus its cached public half.
#[derive(Clone)]
pub struct KeyPair {
    signing: ed25519_dalek::SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Derive a key pair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = ed25519_dalek::SigningKey::from_bytes(&seed);
        let public = PublicKey(signing.verifying_key().to_bytes());
        KeyPair { signing, public }
    }

    /// Generate a fresh key pair from `rng`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// The public half.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish()
    }
}

/// The bytes a validator signs when approving a hash on a given network:
/// the network magic followed by the hash.
pub fn network_signing_data(network: u32, hash: &Hash) -> [u8; 36] {
    let mut data = [0u8; 36];
    data[..4].copy_from_slice(&network.to_le_bytes());
    data[4..].copy_from_slice(hash.as_bytes());
    data
}
