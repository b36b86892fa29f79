use helix_core::HelixError;
use thiserror::Error;

/// Errors local to frame decoding and peer bookkeeping (§7 "Wire"). Converts
/// into `HelixError` at the crate boundary, mirroring `helix_state::StoreError`.
#[derive(Debug, Error)]
pub enum P2pError {
    #[error("malformed frame from peer")]
    MalformedFrame,
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("incompatible peer: {0}")]
    IncompatiblePeer(String),
    #[error("rlp decode error: {0}")]
    Rlp(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<alloy_rlp::Error> for P2pError {
    fn from(err: alloy_rlp::Error) -> Self {
        P2pError::Rlp(err.to_string())
    }
}

impl From<P2pError> for HelixError {
    fn from(err: P2pError) -> Self {
        match err {
            P2pError::MalformedFrame | P2pError::Rlp(_) => HelixError::MalformedFrame,
            P2pError::FrameTooLarge { size, max } => HelixError::FrameTooLarge { size, max },
            P2pError::UnknownPacketType(ty) => HelixError::UnknownPacketType(ty),
            P2pError::IncompatiblePeer(reason) => HelixError::IncompatiblePeer { reason },
            P2pError::Transport(msg) => HelixError::IncompatiblePeer { reason: msg },
        }
    }
}
