//! Witnesses and redeem scripts.
//!
//! A witness authenticates an object with two scripts: the invocation script
//! pushes signatures, the verification script is the redeem script the
//! signatures must satisfy. Block witnesses use the M-of-N multi-signature
//! redeem script over the validator set; payload witnesses use the
//! single-signature script of the sending validator.

use crate::crypto::{PublicKey, Signature};
use crate::encoding::{read_bytes_u16, write_bytes_u16, CodecError, Decode, Encode};
use crate::hash::ScriptHash;
use bytes::{Buf, BufMut};

/// Script opcode: push the following length-prefixed byte string.
pub const OP_PUSHDATA: u8 = 0x0c;
/// Script opcode: push the following one-byte integer.
pub const OP_PUSHINT8: u8 = 0x01;
/// Script opcode: verify one signature against one key.
pub const OP_CHECKSIG: u8 = 0x41;
/// Script opcode: verify m signatures against n keys.
pub const OP_CHECKMULTISIG: u8 = 0x42;

/// Invocation + verification script pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Witness {
    /// Signature pushes.
    pub invocation_script: Vec<u8>,
    /// Redeem script the signatures must satisfy.
    pub verification_script: Vec<u8>,
}

impl Witness {
    /// Serialized size in bytes (both scripts with their u16 prefixes).
    pub fn serialized_size(&self) -> usize {
        2 + self.invocation_script.len() + 2 + self.verification_script.len()
    }

    /// Verify this witness as an m-of-n multi-signature over `message`.
    ///
    /// The verification script must parse as a multi-sig redeem script and
    /// the invocation script as a signature list. Signatures must match keys
    /// in key order (each key is consumed at most once), and at least `m`
    /// signatures must verify.
    pub fn verify_multisig(&self, message: &[u8]) -> bool {
        let Some((m, keys)) = parse_multisig_script(&self.verification_script) else {
            return false;
        };
        let Some(signatures) = parse_invocation_script(&self.invocation_script) else {
            return false;
        };
        if signatures.len() < m || signatures.len() > keys.len() {
            return false;
        }
        let mut key_cursor = 0;
        for signature in &signatures {
            loop {
                if key_cursor == keys.len() {
                    return false;
                }
                let key = keys[key_cursor];
                key_cursor += 1;
                if key.verify(message, signature) {
                    break;
                }
            }
        }
        true
    }
}

impl Encode for Witness {
    fn write<B: BufMut>(&self, buf: &mut B) {
        write_bytes_u16(&self.invocation_script, buf);
        write_bytes_u16(&self.verification_script, buf);
    }
}

impl Decode for Witness {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Witness {
            invocation_script: read_bytes_u16(buf)?,
            verification_script: read_bytes_u16(buf)?,
        })
    }
}

/// Build the single-signature redeem script for `key`.
pub fn signature_redeem_script(key: &PublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(35);
    script.push(OP_PUSHDATA);
    script.push(32);
    script.extend_from_slice(key.as_bytes());
    script.push(OP_CHECKSIG);
    script
}

/// Build the m-of-n multi-signature redeem script for `keys` in the given
/// order.
pub fn multisig_redeem_script(m: usize, keys: &[PublicKey]) -> Vec<u8> {
    debug_assert!(m >= 1 && m <= keys.len() && keys.len() <= u8::MAX as usize);
    let mut script = Vec::with_capacity(4 + keys.len() * 34 + 2);
    script.push(OP_PUSHINT8);
    script.push(m as u8);
    for key in keys {
        script.push(OP_PUSHDATA);
        script.push(32);
        script.extend_from_slice(key.as_bytes());
    }
    script.push(OP_PUSHINT8);
    script.push(keys.len() as u8);
    script.push(OP_CHECKMULTISIG);
    script
}

/// Append a signature push to an invocation script.
pub fn push_signature(invocation: &mut Vec<u8>, signature: &Signature) {
    invocation.push(OP_PUSHDATA);
    invocation.push(Signature::LEN as u8);
    invocation.extend_from_slice(signature.as_bytes());
}

/// The address controlled by the validator set: the script hash of its
/// M-of-N multi-signature redeem script, with `M = N − (N−1)/3`.
pub fn bft_address(validators: &[PublicKey]) -> ScriptHash {
    let n = validators.len();
    let m = n - (n - 1) / 3;
    ScriptHash::of_script(&multisig_redeem_script(m, validators))
}

/// Parse a multi-sig redeem script back into `(m, keys)`.
pub fn parse_multisig_script(script: &[u8]) -> Option<(usize, Vec<PublicKey>)> {
    if script.get(..1)? != [OP_PUSHINT8] {
        return None;
    }
    let m = *script.get(1)? as usize;
    let mut at = 2;
    let mut keys = Vec::new();
    loop {
        match *script.get(at)? {
            OP_PUSHDATA => {
                if *script.get(at + 1)? != 32 {
                    return None;
                }
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(script.get(at + 2..at + 34)?);
                keys.push(PublicKey::new(bytes));
                at += 34;
            }
            OP_PUSHINT8 => break,
            _ => return None,
        }
    }
    let n = *script.get(at + 1)? as usize;
    if script.get(at + 2..)? != [OP_CHECKMULTISIG] {
        return None;
    }
    if n != keys.len() || m == 0 || m > n {
        return None;
    }
    Some((m, keys))
}

/// Parse an invocation script back into its signature pushes.
pub fn parse_invocation_script(script: &[u8]) -> Option<Vec<Signature>> {
    let mut signatures = Vec::new();
    let mut at = 0;
    while at < script.len() {
        if script.get(at..at + 2)? != [OP_PUSHDATA, Signature::LEN as u8] {
            return None;
        }
        at += 2;
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(script.get(at..at + Signature::LEN)?);
        signatures.push(Signature::new(bytes));
        at += Signature::LEN;
    }
    Some(signatures)
}
