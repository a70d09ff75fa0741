//! Merkle root over a transaction hash list.

use crate::hash::Hash;
use sha2::{Digest, Sha256};

/// Compute the merkle root of `hashes`.
///
/// The empty list yields [`Hash::ZERO`]. A level with an odd node count
/// duplicates its last node. Parents are the double SHA-256 of the
/// concatenated child digests.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level[level.len() - 1]);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| {
                let mut data = [0u8; 64];
                data[..32].copy_from_slice(pair[0].as_bytes());
                data[32..].copy_from_slice(pair[1].as_bytes());
                let first = Sha256::digest(data);
                Hash::new(Sha256::digest(first).into())
            })
            .collect();
    }
    level[0]
}
