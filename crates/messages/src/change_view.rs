//! Change-view message.

use bytes::{Buf, BufMut};
use dbft_types::{read_u64, read_u8, CodecError, Decode, Encode};

/// Why a validator asked to leave the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChangeViewReason {
    /// The view timed out without producing a block.
    Timeout = 0x00,
    /// Enough peers already asked for the same change.
    ChangeAgreement = 0x01,
    /// A proposed transaction could not be retrieved.
    TxNotFound = 0x02,
    /// A proposed transaction failed verification.
    TxRejected = 0x03,
    /// The proposal itself failed verification.
    BlockRejected = 0x04,
}

impl ChangeViewReason {
    fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0x00 => Ok(ChangeViewReason::Timeout),
            0x01 => Ok(ChangeViewReason::ChangeAgreement),
            0x02 => Ok(ChangeViewReason::TxNotFound),
            0x03 => Ok(ChangeViewReason::TxRejected),
            0x04 => Ok(ChangeViewReason::BlockRejected),
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

/// Request to advance past the current view. The proposed view is always
/// one above the view the message was sent in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeView {
    /// Sender's clock at send time, milliseconds since the epoch.
    pub timestamp: u64,
    /// Why the sender gave up on the view.
    pub reason: ChangeViewReason,
}

impl Encode for ChangeView {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(self.timestamp);
        buf.put_u8(self.reason as u8);
    }
}

impl Decode for ChangeView {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(ChangeView {
            timestamp: read_u64(buf)?,
            reason: ChangeViewReason::from_u8(read_u8(buf)?)?,
        })
    }
}
