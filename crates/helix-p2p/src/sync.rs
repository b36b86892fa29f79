use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use libp2p::PeerId;
use thiserror::Error;
use tracing::{debug, warn};

use helix_consensus::ValidatorSet;
use helix_core::header::FinalHeader;
use helix_core::types::{BlockHash, Level, Period};
use helix_core::vote::{Step, Vote};
use helix_core::HelixError;
use helix_core::constants::{
    SYNC_DAG_LEVEL_BATCH, SYNC_PBFT_PERIOD_BATCH, SYNC_STALL_TIMEOUT_SECS,
};

use crate::message::WireMessage;

/// Errors local to catch-up (§7 "Sync failure").
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("peer response did not reach the required {required} quorum (got {got})")]
    QuorumNotMet { required: u64, got: u64 },
    #[error("certified header's anchor {0:?} is not yet known to the local DAG")]
    AnchorUnknown(BlockHash),
    #[error("vote {0:?} in response is not a certify-vote for the claimed anchor")]
    WrongVoteShape(helix_core::types::VoteHash),
    #[error("crypto failure validating a certified vote: {0}")]
    Crypto(String),
    #[error("exhausted after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
}

impl From<SyncError> for HelixError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Exhausted { attempts, reason } => {
                HelixError::SyncExhausted { attempts, reason }
            }
            other => HelixError::SyncExhausted { attempts: 0, reason: other.to_string() },
        }
    }
}

/// Drives DAG-by-level and PBFT-by-period catch-up against the best peer
/// (§4.7). Two independent cursors advance at their own pace; DAG sync must
/// outrun PBFT sync since a certified header's anchor must already be known
/// locally before its votes can be validated.
pub struct SyncDriver {
    dag_cursor: Level,
    pbft_cursor: Period,
    last_progress: Instant,
    peer_failures: HashMap<PeerId, u32>,
    malicious: HashSet<PeerId>,
}

impl SyncDriver {
    pub fn new(local_max_level: Level, local_last_period: Period) -> Self {
        Self {
            dag_cursor: local_max_level,
            pbft_cursor: local_last_period,
            last_progress: Instant::now(),
            peer_failures: HashMap::new(),
            malicious: HashSet::new(),
        }
    }

    /// The next `GetBlocksLevel` request to issue.
    pub fn next_dag_request(&self) -> WireMessage {
        WireMessage::GetBlocksLevel {
            start_level: self.dag_cursor + 1,
            count: SYNC_DAG_LEVEL_BATCH,
        }
    }

    /// The next `GetPbftBlock` request to issue.
    pub fn next_pbft_request(&self) -> WireMessage {
        WireMessage::GetPbftBlock {
            start_period: self.pbft_cursor + 1,
            count: SYNC_PBFT_PERIOD_BATCH,
        }
    }

    /// Call once new levels have actually been linked into the DAG.
    pub fn record_dag_progress(&mut self, new_max_level: Level) {
        if new_max_level > self.dag_cursor {
            self.dag_cursor = new_max_level;
            self.last_progress = Instant::now();
        }
    }

    /// Call once new periods have actually been finalised.
    pub fn record_pbft_progress(&mut self, new_last_period: Period) {
        if new_last_period > self.pbft_cursor {
            self.pbft_cursor = new_last_period;
            self.last_progress = Instant::now();
        }
    }

    /// True once no progress has been made for `SYNC_STALL_TIMEOUT_SECS` —
    /// the caller should rotate to the next-best peer.
    pub fn has_stalled(&self) -> bool {
        self.last_progress.elapsed() >= Duration::from_secs(SYNC_STALL_TIMEOUT_SECS)
    }

    /// Exponential backoff delay before retrying a peer that just failed,
    /// capped so a flaky peer is retried at most once a minute.
    pub fn backoff_for(attempt: u32) -> Duration {
        let capped = attempt.min(6);
        Duration::from_secs(1u64 << capped).min(Duration::from_secs(60))
    }

    /// Record a failure from `peer`. Returns `true` once the peer has been
    /// added to the expiring malicious set and should be rotated out.
    pub fn record_failure(&mut self, peer: PeerId) -> bool {
        let failures = self.peer_failures.entry(peer).or_insert(0);
        *failures += 1;
        if *failures >= 3 {
            warn!(peer = %peer, failures = *failures, "peer rotated out of sync duty");
            self.malicious.insert(peer);
            true
        } else {
            false
        }
    }

    pub fn is_malicious(&self, peer: &PeerId) -> bool {
        self.malicious.contains(peer)
    }

    /// Clears a peer's failure count after a clean response.
    pub fn record_success(&mut self, peer: PeerId) {
        self.peer_failures.remove(&peer);
    }

    /// Picks the first non-malicious candidate, preferring the one with the
    /// fewest recorded failures.
    pub fn select_peer<'a>(&self, candidates: &'a [PeerId]) -> Option<&'a PeerId> {
        candidates
            .iter()
            .filter(|p| !self.malicious.contains(*p))
            .min_by_key(|p| self.peer_failures.get(*p).copied().unwrap_or(0))
    }
}

/// Validates one `PbftBlock` response entry against the local validator set
/// before the finaliser is invoked (§4.7): every cert-vote must carry a
/// genuine signature and VRF proof for a validator actually eligible at
/// this `(period, round, step)`, must be a `Certify` vote for the claimed
/// anchor, and the distinct voters' stake must clear the quorum threshold.
pub fn verify_certified_header(
    header: &FinalHeader,
    anchor: BlockHash,
    certified_votes: &[Vote],
    validators: &ValidatorSet,
) -> Result<(), SyncError> {
    let mut counted = HashSet::new();
    let mut stake = 0u64;

    for vote in certified_votes {
        if vote.body.step != Step::Certify || vote.body.voted_hash != anchor {
            return Err(SyncError::WrongVoteShape(vote.hash));
        }
        let Some(validator) = validators.get(&vote.voter) else {
            continue;
        };
        let digest = vote.body.signing_digest();
        helix_crypto::verify_sender(&digest, &vote.signature, vote.voter)
            .map_err(|e| SyncError::Crypto(e.to_string()))?;
        let vrf_output = helix_crypto::vrf::verify(
            &validator.vrf_key,
            vote.body.period,
            vote.body.round,
            vote.body.step,
            &vote.body.vrf_proof,
        )
        .map_err(|e| SyncError::Crypto(e.to_string()))?;
        let draw = u64::from_be_bytes(vrf_output[..8].try_into().unwrap());
        if draw >= validators.sortition_threshold(validator.stake) {
            continue;
        }
        if counted.insert(vote.voter) {
            stake += validator.stake;
        }
    }

    let required = validators.quorum_threshold();
    if stake < required {
        return Err(SyncError::QuorumNotMet { required, got: stake });
    }
    debug!(period = header.period, %anchor, stake, required, "certified header verified");
    Ok(())
}
