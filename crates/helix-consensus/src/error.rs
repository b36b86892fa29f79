use helix_core::types::{Address, Period, Round, VoteHash};
use helix_core::HelixError;
use thiserror::Error;

/// Errors local to vote validation and round/step bookkeeping. Converts into
/// `HelixError` at the crate boundary, mirroring `helix_state::StoreError`.
#[derive(Debug, Error)]
pub enum PbftError {
    #[error("vote {0:?} has a bad signature")]
    BadSignature(VoteHash),
    #[error("vote {0:?} failed VRF verification")]
    FailedVrf(VoteHash),
    #[error("voter {voter:?} is not eligible at period {period} round {round}")]
    IneligibleVoter {
        voter: Address,
        period: Period,
        round: Round,
    },
    #[error("voter {voter:?} double-voted at period {period} round {round}")]
    Equivocation {
        voter: Address,
        period: Period,
        round: Round,
    },
    #[error("voter {0:?} is not a member of the validator set")]
    UnknownValidator(Address),
    #[error("crypto failure: {0}")]
    Crypto(String),
}

impl From<PbftError> for HelixError {
    fn from(err: PbftError) -> Self {
        match err {
            PbftError::BadSignature(hash) => HelixError::VoteBadSignature(hash),
            PbftError::FailedVrf(hash) => HelixError::VoteFailedVrf(hash),
            PbftError::IneligibleVoter {
                voter,
                period,
                round,
            } => HelixError::VoteIneligibleVoter {
                voter,
                period,
                round,
            },
            PbftError::Equivocation {
                voter,
                period,
                round,
            } => HelixError::VoteEquivocation {
                voter,
                period,
                round,
            },
            PbftError::UnknownValidator(voter) => HelixError::VoteIneligibleVoter {
                voter,
                period: 0,
                round: 0,
            },
            PbftError::Crypto(msg) => HelixError::Crypto(msg),
        }
    }
}
