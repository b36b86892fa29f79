use helix_core::types::{Address, RecoverableSignature};

use crate::error::CryptoError;

/// Derive the address a public key controls: keccak256 of the uncompressed
/// public key (minus the leading 0x04 tag), last 20 bytes — the same
/// construction documented on `helix_core::types::Address`.
pub fn address_from_pubkey(public: &libsecp256k1::PublicKey) -> Address {
    let uncompressed = public.serialize();
    let digest = helix_core::hash_bytes(&uncompressed[1..]);
    Address::from_slice(&digest[12..])
}

/// Sign a 32-byte digest, producing a 65-byte `r ‖ s ‖ recovery_id` signature.
pub fn sign_hash(secret: &libsecp256k1::SecretKey, digest: &[u8; 32]) -> RecoverableSignature {
    let message = libsecp256k1::Message::parse(digest);
    let (signature, recovery_id) = libsecp256k1::sign(&message, secret);
    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&signature.serialize());
    bytes[64] = recovery_id.serialize();
    RecoverableSignature(bytes)
}

/// Recover the address that produced `signature` over `digest`.
pub fn recover_sender(
    digest: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<Address, CryptoError> {
    let message = libsecp256k1::Message::parse(digest);
    let sig_bytes: [u8; 64] = signature.0[..64]
        .try_into()
        .expect("RecoverableSignature is 65 bytes");
    let sig =
        libsecp256k1::Signature::parse_standard(&sig_bytes).map_err(|_| CryptoError::InvalidSignature)?;
    let recovery_id =
        libsecp256k1::RecoveryId::parse(signature.0[64]).map_err(|_| CryptoError::InvalidSignature)?;
    let public = libsecp256k1::recover(&message, &sig, &recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(address_from_pubkey(&public))
}

/// Verify that `signature` over `digest` recovers to `expected`.
pub fn verify_sender(
    digest: &[u8; 32],
    signature: &RecoverableSignature,
    expected: Address,
) -> Result<(), CryptoError> {
    let recovered = recover_sender(digest, signature)?;
    if recovered == expected {
        Ok(())
    } else {
        Err(CryptoError::RecoveryFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_secret() -> libsecp256k1::SecretKey {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(sk) = libsecp256k1::SecretKey::parse(&bytes) {
                return sk;
            }
        }
    }

    #[test]
    fn sign_then_recover_round_trips_to_same_address() {
        let secret = random_secret();
        let public = libsecp256k1::PublicKey::from_secret_key(&secret);
        let address = address_from_pubkey(&public);

        let digest = helix_core::hash_bytes(b"a transaction body");
        let signature = sign_hash(&secret, &digest);
        let recovered = recover_sender(&digest, &signature).unwrap();
        assert_eq!(recovered, address);
        assert!(verify_sender(&digest, &signature, address).is_ok());
    }

    #[test]
    fn tampered_digest_recovers_different_address() {
        let secret = random_secret();
        let public = libsecp256k1::PublicKey::from_secret_key(&secret);
        let address = address_from_pubkey(&public);

        let digest = helix_core::hash_bytes(b"original");
        let signature = sign_hash(&secret, &digest);
        let tampered = helix_core::hash_bytes(b"tampered");
        let recovered = recover_sender(&tampered, &signature).unwrap();
        assert_ne!(recovered, address);
    }
}
