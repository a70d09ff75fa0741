//! Consensus messages for the dBFT protocol.
//!
//! The message set is closed: every payload on the wire decodes to exactly
//! one [`MessageKind`] variant inside a [`ConsensusMessage`] envelope that
//! carries the round coordinates (block index, validator index, view
//! number). Dispatch is over the tagged enum; there is no open registry.

mod change_view;
mod commit;
mod prepare;
mod recovery;

pub use change_view::{ChangeView, ChangeViewReason};
pub use commit::{Commit, PreCommit};
pub use prepare::{PrepareRequest, PrepareResponse};
pub use recovery::{
    ChangeViewCompact, CommitCompact, PreCommitCompact, PreparationCompact, RecoveryMessage,
    RecoveryRequest,
};

use bytes::{Buf, BufMut};
use dbft_types::{read_u32, read_u8, CodecError, Decode, Encode};

/// Wire tag for [`ChangeView`].
pub const TAG_CHANGE_VIEW: u8 = 0x00;
/// Wire tag for [`PrepareRequest`].
pub const TAG_PREPARE_REQUEST: u8 = 0x20;
/// Wire tag for [`PrepareResponse`].
pub const TAG_PREPARE_RESPONSE: u8 = 0x21;
/// Wire tag for [`PreCommit`].
pub const TAG_PRE_COMMIT: u8 = 0x30;
/// Wire tag for [`Commit`].
pub const TAG_COMMIT: u8 = 0x31;
/// Wire tag for [`RecoveryRequest`].
pub const TAG_RECOVERY_REQUEST: u8 = 0x40;
/// Wire tag for [`RecoveryMessage`].
pub const TAG_RECOVERY_MESSAGE: u8 = 0x41;

/// The closed set of consensus message bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Request to advance past the current view.
    ChangeView(ChangeView),
    /// A primary's block proposal.
    PrepareRequest(PrepareRequest),
    /// A backup's acknowledgement of a proposal.
    PrepareResponse(PrepareResponse),
    /// Announcement of a preparation quorum.
    PreCommit(PreCommit),
    /// The sender's block signature.
    Commit(Commit),
    /// Plea for round-state retransmission.
    RecoveryRequest(RecoveryRequest),
    /// Round-state retransmission.
    RecoveryMessage(Box<RecoveryMessage>),
}

impl MessageKind {
    /// The wire tag of this variant.
    pub fn tag(&self) -> u8 {
        match self {
            MessageKind::ChangeView(_) => TAG_CHANGE_VIEW,
            MessageKind::PrepareRequest(_) => TAG_PREPARE_REQUEST,
            MessageKind::PrepareResponse(_) => TAG_PREPARE_RESPONSE,
            MessageKind::PreCommit(_) => TAG_PRE_COMMIT,
            MessageKind::Commit(_) => TAG_COMMIT,
            MessageKind::RecoveryRequest(_) => TAG_RECOVERY_REQUEST,
            MessageKind::RecoveryMessage(_) => TAG_RECOVERY_MESSAGE,
        }
    }

    /// A human-readable name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageKind::ChangeView(_) => "ChangeView",
            MessageKind::PrepareRequest(_) => "PrepareRequest",
            MessageKind::PrepareResponse(_) => "PrepareResponse",
            MessageKind::PreCommit(_) => "PreCommit",
            MessageKind::Commit(_) => "Commit",
            MessageKind::RecoveryRequest(_) => "RecoveryRequest",
            MessageKind::RecoveryMessage(_) => "RecoveryMessage",
        }
    }
}

/// A consensus message with its round coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    /// Index of the block the round is producing.
    pub block_index: u32,
    /// Index of the sending validator in the round's validator list.
    pub validator_index: u8,
    /// View the message was sent in.
    pub view_number: u8,
    /// The message body.
    pub kind: MessageKind,
}

impl ConsensusMessage {
    /// For a change view, the view the sender proposes to move to.
    pub fn new_view_number(&self) -> Option<u8> {
        match &self.kind {
            MessageKind::ChangeView(_) => Some(self.view_number.wrapping_add(1)),
            _ => None,
        }
    }

    /// The commit signature, when this is a commit.
    pub fn commit_signature(&self) -> Option<&dbft_types::Signature> {
        match &self.kind {
            MessageKind::Commit(commit) => Some(&commit.signature),
            _ => None,
        }
    }
}

impl Encode for ConsensusMessage {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.kind.tag());
        buf.put_u32_le(self.block_index);
        buf.put_u8(self.validator_index);
        buf.put_u8(self.view_number);
        match &self.kind {
            MessageKind::ChangeView(m) => m.write(buf),
            MessageKind::PrepareRequest(m) => m.write(buf),
            MessageKind::PrepareResponse(m) => m.write(buf),
            MessageKind::PreCommit(m) => m.write(buf),
            MessageKind::Commit(m) => m.write(buf),
            MessageKind::RecoveryRequest(m) => m.write(buf),
            MessageKind::RecoveryMessage(m) => m.write(buf),
        }
    }
}

impl Decode for ConsensusMessage {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let tag = read_u8(buf)?;
        let block_index = read_u32(buf)?;
        let validator_index = read_u8(buf)?;
        let view_number = read_u8(buf)?;
        let kind = match tag {
            TAG_CHANGE_VIEW => MessageKind::ChangeView(ChangeView::read(buf)?),
            TAG_PREPARE_REQUEST => MessageKind::PrepareRequest(PrepareRequest::read(buf)?),
            TAG_PREPARE_RESPONSE => MessageKind::PrepareResponse(PrepareResponse::read(buf)?),
            TAG_PRE_COMMIT => MessageKind::PreCommit(PreCommit::read(buf)?),
            TAG_COMMIT => MessageKind::Commit(Commit::read(buf)?),
            TAG_RECOVERY_REQUEST => MessageKind::RecoveryRequest(RecoveryRequest::read(buf)?),
            TAG_RECOVERY_MESSAGE => {
                MessageKind::RecoveryMessage(Box::new(RecoveryMessage::read(buf)?))
            }
            other => return Err(CodecError::UnknownTag(other)),
        };
        Ok(ConsensusMessage {
            block_index,
            validator_index,
            view_number,
            kind,
        })
    }
}
