use std::collections::HashMap;

use helix_core::constants::{PBFT_ROUND_DELTA_MS, PBFT_STEP_BASE_MS, PBFT_STEP_DELTA_MS};
use helix_core::types::{Address, BlockHash, Period, Round, VoteHash};
use helix_core::vote::{Step, Vote, VoteBody};
use helix_crypto::{SigningKeyPair, VrfKeyPair};
use tracing::{debug, info, warn};

use crate::error::PbftError;
use crate::validator::ValidatorSet;

/// Votes tallied for one hash within one (round, step): the summed stake of
/// every distinct voter who has cast a vote for it, plus the votes
/// themselves (needed to persist the certified set once a quorum forms).
#[derive(Debug, Default)]
struct StepTally {
    stake: u64,
    votes: Vec<Vote>,
}

/// One node's view of the PBFT round/step machine for a single period
/// (§4.5). Ingests votes (its own and peers'), tallies them by stake, and
/// exposes what the node should do next — cast a vote, advance the step,
/// time out into a null next-vote, or commit a finalised anchor. Driving the
/// clock (when to call `advance_step`/`on_timeout`) and delivering votes
/// between peers is left to the caller; this type holds no I/O.
pub struct PbftMachine {
    signing: SigningKeyPair,
    vrf: VrfKeyPair,
    validators: ValidatorSet,
    period: Period,
    round: Round,
    step: Step,
    last_committed_period: Option<Period>,
    votes: HashMap<(Round, Step), HashMap<BlockHash, StepTally>>,
    voted: HashMap<(Address, Period, Round, Step), BlockHash>,
    /// The certified next-vote set from the previous round, if one formed —
    /// soft-voters in this round must vote for it instead of the highest-VRF
    /// propose vote (§4.5).
    prev_round_certified_next: Option<(BlockHash, Vec<Vote>)>,
}

impl PbftMachine {
    pub fn new(
        signing: SigningKeyPair,
        vrf: VrfKeyPair,
        validators: ValidatorSet,
        start_period: Period,
    ) -> Self {
        Self {
            signing,
            vrf,
            validators,
            period: start_period,
            round: 1,
            step: Step::Propose,
            last_committed_period: None,
            votes: HashMap::new(),
            voted: HashMap::new(),
            prev_round_certified_next: None,
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn last_committed_period(&self) -> Option<Period> {
        self.last_committed_period
    }

    /// Deadline for the current step, in milliseconds from when it started:
    /// `base + step·Δ_step + round·Δ_round` — super-linear in round so the
    /// network has time to heal after a partition (§4.5).
    pub fn step_deadline_ms(&self) -> u64 {
        PBFT_STEP_BASE_MS
            + (self.step as u64) * PBFT_STEP_DELTA_MS
            + u64::from(self.round) * PBFT_ROUND_DELTA_MS
    }

    pub fn advance_step(&mut self) {
        self.step = match self.step {
            Step::Propose => Step::Soft,
            Step::Soft => Step::Certify,
            Step::Certify => Step::Next,
            Step::Next => Step::Next,
        };
    }

    /// Attempt to cast this node's own vote for the current `(period, round,
    /// step)`, `voted_hash`. Returns `Ok(None)` when VRF sortition does not
    /// select this node for the step — a normal, frequent outcome, not an
    /// error.
    pub fn try_own_vote(&mut self, voted_hash: BlockHash) -> Result<Option<Vote>, PbftError> {
        let stake = self
            .validators
            .get(&self.signing.address)
            .map(|v| v.stake)
            .ok_or(PbftError::UnknownValidator(self.signing.address))?;

        let proof = self
            .vrf
            .prove(self.period, self.round, self.step)
            .map_err(|e| PbftError::Crypto(e.to_string()))?;
        let output = helix_crypto::vrf::output(&proof);
        let value = u64::from_be_bytes(output[..8].try_into().expect("32-byte output"));
        if value >= self.validators.sortition_threshold(stake) {
            return Ok(None);
        }

        let body = VoteBody {
            period: self.period,
            round: self.round,
            step: self.step,
            voted_hash,
            vrf_proof: proof,
        };
        let digest = body.signing_digest();
        let signature = self
            .signing
            .sign(&digest)
            .map_err(|e| PbftError::Crypto(e.to_string()))?;
        let mut vote = Vote {
            body,
            signature,
            hash: VoteHash::from_bytes([0u8; 32]),
            voter: self.signing.address,
        };
        vote.hash = vote.compute_hash();

        self.ingest_vote(vote.clone())?;
        Ok(Some(vote))
    }

    /// Verify and tally a vote received from a peer (or from `try_own_vote`
    /// feeding its own output back in). Returns `Ok(true)` if the vote was
    /// new and counted, `Ok(false)` if it was a harmless duplicate of a vote
    /// already tallied from the same voter.
    pub fn ingest_vote(&mut self, vote: Vote) -> Result<bool, PbftError> {
        let validator = self
            .validators
            .get(&vote.voter)
            .ok_or(PbftError::UnknownValidator(vote.voter))?;

        let digest = vote.body.signing_digest();
        helix_crypto::verify_sender(&digest, &vote.signature, vote.voter)
            .map_err(|_| PbftError::BadSignature(vote.hash))?;

        let output = helix_crypto::vrf::verify(
            &validator.vrf_key,
            vote.body.period,
            vote.body.round,
            vote.body.step,
            &vote.body.vrf_proof,
        )
        .map_err(|_| PbftError::FailedVrf(vote.hash))?;
        let value = u64::from_be_bytes(output[..8].try_into().expect("32-byte output"));
        if value >= self.validators.sortition_threshold(validator.stake) {
            return Err(PbftError::IneligibleVoter {
                voter: vote.voter,
                period: vote.body.period,
                round: vote.body.round,
            });
        }

        let key = vote.dedup_key();
        if let Some(existing) = self.voted.get(&key) {
            if *existing != vote.body.voted_hash {
                warn!(
                    voter = %vote.voter,
                    period = vote.body.period,
                    round = vote.body.round,
                    step = ?vote.body.step,
                    "equivocating vote rejected"
                );
                return Err(PbftError::Equivocation {
                    voter: vote.voter,
                    period: vote.body.period,
                    round: vote.body.round,
                });
            }
            return Ok(false);
        }
        self.voted.insert(key, vote.body.voted_hash);

        debug!(
            voter = %vote.voter,
            period = vote.body.period,
            round = vote.body.round,
            step = ?vote.body.step,
            "vote tallied"
        );
        let tally = self
            .votes
            .entry((vote.body.round, vote.body.step))
            .or_default()
            .entry(vote.body.voted_hash)
            .or_default();
        tally.stake += validator.stake;
        tally.votes.push(vote);
        Ok(true)
    }

    fn quorum_hash(&self, round: Round, step: Step) -> Option<(BlockHash, Vec<Vote>)> {
        let threshold = self.validators.quorum_threshold();
        self.votes.get(&(round, step))?.iter().find_map(|(hash, tally)| {
            (tally.stake >= threshold).then(|| (*hash, tally.votes.clone()))
        })
    }

    /// The hash this node should soft-vote for: the previous round's
    /// certified next-vote set if one exists, otherwise the propose vote
    /// with the highest VRF output seen so far this round (§4.5).
    pub fn soft_vote_target(&self) -> Option<BlockHash> {
        if let Some((hash, _)) = &self.prev_round_certified_next {
            return Some(*hash);
        }
        self.votes
            .get(&(self.round, Step::Propose))?
            .values()
            .flat_map(|t| t.votes.iter())
            .max_by(|a, b| {
                vrf_weight(a)
                    .cmp(&vrf_weight(b))
                    .then_with(|| a.hash.cmp(&b.hash))
            })
            .map(|v| v.body.voted_hash)
    }

    /// The hash this node should certify-vote for: whichever hash has
    /// reached quorum soft-votes this round, if any.
    pub fn certify_vote_target(&self) -> Option<BlockHash> {
        self.quorum_hash(self.round, Step::Soft).map(|(hash, _)| hash)
    }

    /// The hash this node should next-vote for, given its own soft vote this
    /// round (if any): the just-soft-voted hash, falling back to the
    /// previous round's certified next-vote hash, falling back to the null
    /// hash (§4.5).
    pub fn next_vote_target(&self, own_soft_vote: Option<BlockHash>) -> BlockHash {
        own_soft_vote
            .or_else(|| self.prev_round_certified_next.as_ref().map(|(h, _)| *h))
            .unwrap_or_else(BlockHash::zero)
    }

    /// If a hash has reached quorum certify-votes this round, the period is
    /// locally certified and this is its anchor plus the vote set that
    /// proves it — the caller should finalise the period with this set and
    /// call `commit`.
    pub fn committed_anchor(&self) -> Option<(BlockHash, Vec<Vote>)> {
        self.quorum_hash(self.round, Step::Certify)
    }

    /// Advance to the next period after finalising `anchor`, resetting round
    /// and step and clearing all vote-tallying state.
    pub fn commit(&mut self, anchor: BlockHash) {
        info!(period = self.period, %anchor, "period committed");
        self.last_committed_period = Some(self.period);
        self.period += 1;
        self.round = 1;
        self.step = Step::Propose;
        self.votes.clear();
        self.voted.clear();
        self.prev_round_certified_next = None;
    }

    /// End the current round without committing: carry this round's
    /// certified next-vote set (if any) forward, then reset to `Propose` of
    /// `round + 1`.
    pub fn advance_round(&mut self) {
        if let Some((hash, votes)) = self.quorum_hash(self.round, Step::Next) {
            self.prev_round_certified_next = Some((hash, votes));
        }
        self.round += 1;
        self.step = Step::Propose;
    }

    /// Step deadline expired without a certified commit: cast a next-vote
    /// for `own_soft_vote` (or whatever `next_vote_target` falls back to) if
    /// VRF sortition selects this node for the step, then advance to the
    /// next round regardless — the clock moves forward whether or not this
    /// node itself got to vote (§4.5).
    pub fn on_timeout(&mut self, own_soft_vote: Option<BlockHash>) -> Result<Option<Vote>, PbftError> {
        let target = self.next_vote_target(own_soft_vote);
        self.step = Step::Next;
        let vote = self.try_own_vote(target)?;
        self.advance_round();
        Ok(vote)
    }
}

fn vrf_weight(vote: &Vote) -> u64 {
    let output = helix_crypto::vrf::output(&vote.body.vrf_proof);
    u64::from_be_bytes(output[..8].try_into().expect("32-byte output"))
}
