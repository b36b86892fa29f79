//! Sortition proofs.
//!
//! There is no dedicated VRF crate anywhere in reach, so eligibility proofs
//! are built from a plain Ed25519 signature: the proof over a round/step seed
//! is the signature itself, and the VRF "output" is the hash of that
//! signature. This has the properties PBFT sortition actually needs
//! (unpredictable before the seed is known, publicly verifiable, unique per
//! signing key) without requiring a true VRF construction.

use ed25519_dalek::{
    Keypair as EdKeypair, PublicKey as EdPublicKey, SecretKey as EdSecretKey, Signature as EdSignature,
};
use ed25519_dalek::{Signer, Verifier};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use helix_core::types::{Period, Round, VrfProof, VrfPublicKey};
use helix_core::vote::Step;

use crate::error::CryptoError;

/// The bytes proven over: the voter's own VRF public key plus the round
/// coordinate, so that proofs are neither replayable across voters nor
/// across rounds.
pub fn vrf_seed(voter_vrf_key: &VrfPublicKey, period: Period, round: Round, step: Step) -> Vec<u8> {
    let mut seed = Vec::with_capacity(32 + 8 + 4 + 1);
    seed.extend_from_slice(&voter_vrf_key.0);
    seed.extend_from_slice(&period.to_be_bytes());
    seed.extend_from_slice(&round.to_be_bytes());
    seed.push(step as u8);
    seed
}

/// A node's Ed25519 sortition keypair, independent of its secp256k1 signing
/// key.
#[derive(Serialize, Deserialize)]
pub struct VrfKeyPair {
    pub public: VrfPublicKey,
    #[serde(with = "secret_key_bytes")]
    secret: Zeroizing<[u8; 32]>,
}

impl VrfKeyPair {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let secret = EdSecretKey::from_bytes(&bytes).expect("32 random bytes are a valid Ed25519 secret key");
        let public = EdPublicKey::from(&secret);
        Self {
            public: VrfPublicKey(public.to_bytes()),
            secret: Zeroizing::new(bytes),
        }
    }

    pub fn from_raw(secret_bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let secret =
            EdSecretKey::from_bytes(&secret_bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = EdPublicKey::from(&secret);
        Ok(Self {
            public: VrfPublicKey(public.to_bytes()),
            secret: Zeroizing::new(secret_bytes),
        })
    }

    /// Produce a sortition proof for `(period, round, step)`.
    pub fn prove(&self, period: Period, round: Round, step: Step) -> Result<VrfProof, CryptoError> {
        let secret =
            EdSecretKey::from_bytes(&*self.secret).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = EdPublicKey::from(&secret);
        let keypair = EdKeypair { secret, public };
        let seed = vrf_seed(&self.public, period, round, step);
        let signature = keypair.sign(&seed);
        Ok(VrfProof(signature.to_bytes()))
    }
}

impl std::fmt::Debug for VrfKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VrfKeyPair {{ public: {:?} }}", self.public)
    }
}

/// Verify a sortition proof and return its VRF output (the hash of the
/// underlying signature), which callers compare against the sortition
/// threshold.
pub fn verify(
    public: &VrfPublicKey,
    period: Period,
    round: Round,
    step: Step,
    proof: &VrfProof,
) -> Result<[u8; 32], CryptoError> {
    let ed_public = EdPublicKey::from_bytes(&public.0).map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature = EdSignature::from_bytes(&proof.0).map_err(|_| CryptoError::InvalidSignature)?;
    let seed = vrf_seed(public, period, round, step);
    ed_public
        .verify(&seed, &signature)
        .map_err(|_| CryptoError::VrfVerificationFailed)?;
    Ok(output(proof))
}

/// The VRF output of an already-verified proof.
pub fn output(proof: &VrfProof) -> [u8; 32] {
    helix_core::hash_bytes(&proof.0)
}

mod secret_key_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use zeroize::Zeroizing;

    pub fn serialize<S: Serializer>(
        value: &Zeroizing<[u8; 32]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        (**value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Zeroizing<[u8; 32]>, D::Error> {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        Ok(Zeroizing::new(bytes))
    }
}
