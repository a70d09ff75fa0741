//! Foundation types for the dBFT consensus context.
//!
//! This crate provides the types shared by the message and consensus layers:
//!
//! - **Digests**: [`Hash`] (32-byte object hashes) and [`ScriptHash`]
//!   (20-byte script addresses)
//! - **Keys**: [`KeyPair`], [`PublicKey`], [`Signature`]
//! - **Chain objects**: [`BlockHeader`], [`Block`], [`Transaction`],
//!   [`ExtensiblePayload`]
//! - **Witnesses**: redeem-script builders and multi-signature verification
//! - **Encoding**: the deterministic little-endian codec every persisted or
//!   gossiped object uses
//!
//! # Design Philosophy
//!
//! This crate is self-contained and depends on no other workspace crate,
//! making it the foundation layer.

mod block;
mod crypto;
mod encoding;
mod hash;
mod merkle;
mod payload;
mod transaction;
mod validator;
mod witness;

pub use block::{Block, BlockHeader};
pub use crypto::{network_signing_data, KeyPair, PublicKey, Signature};
pub use encoding::{
    ensure, read_array, read_bytes_u16, read_bytes_u32, read_bytes_u8, read_list_u16,
    read_nullable_array, read_u16, read_u32, read_u64, read_u8, write_bytes_u16, write_bytes_u32,
    write_bytes_u8, write_list_u16, write_nullable_array, CodecError, Decode, Encode,
};
pub use hash::{Hash, HexError, ScriptHash};
pub use merkle::merkle_root;
pub use payload::{ExtensiblePayload, CONSENSUS_CATEGORY, MAX_PAYLOAD_DATA};
pub use transaction::{Transaction, TransactionVerificationContext};
pub use validator::{fault_tolerance, quorum};
pub use witness::{
    bft_address, multisig_redeem_script, parse_invocation_script, parse_multisig_script,
    push_signature, signature_redeem_script, Witness, OP_CHECKMULTISIG, OP_CHECKSIG, OP_PUSHDATA,
    OP_PUSHINT8,
};
