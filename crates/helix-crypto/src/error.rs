use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature does not recover to a valid public key")]
    RecoveryFailed,
    #[error("VRF proof failed verification")]
    VrfVerificationFailed,
}
