//! Pre-commit and commit messages.

use bytes::{Buf, BufMut};
use dbft_types::{CodecError, Decode, Encode, Hash, Signature};

/// Announcement that a quorum of preparations has been observed for a
/// proposal, identified by its prepare-request payload hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCommit {
    /// Hash of the prepare-request payload being pre-committed to.
    pub preparation_hash: Hash,
}

impl Encode for PreCommit {
    fn write<B: BufMut>(&self, buf: &mut B) {
        self.preparation_hash.write(buf);
    }
}

impl Decode for PreCommit {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(PreCommit {
            preparation_hash: Hash::read(buf)?,
        })
    }
}

/// The sender's block signature. A quorum of matching-view commits seals
/// the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Signature over the candidate block hash under the network magic.
    pub signature: Signature,
}

impl Encode for Commit {
    fn write<B: BufMut>(&self, buf: &mut B) {
        self.signature.write(buf);
    }
}

impl Decode for Commit {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Commit {
            signature: Signature::read(buf)?,
        })
    }
}
