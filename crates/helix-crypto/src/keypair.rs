use helix_core::types::Address;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::sign::{address_from_pubkey, sign_hash};

/// A node's secp256k1 signing keypair, used for transactions, DAG blocks and
/// PBFT votes — everything that carries a recoverable sender signature.
///
/// The secret key is held in a `Zeroizing` buffer so it is wiped on drop.
#[derive(Serialize, Deserialize)]
pub struct SigningKeyPair {
    pub address: Address,
    #[serde(with = "secret_key_bytes")]
    secret: Zeroizing<[u8; 32]>,
}

impl SigningKeyPair {
    /// Generate a fresh keypair from system randomness.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(secret) = libsecp256k1::SecretKey::parse(&bytes) {
                let public = libsecp256k1::PublicKey::from_secret_key(&secret);
                return Self {
                    address: address_from_pubkey(&public),
                    secret: Zeroizing::new(bytes),
                };
            }
        }
    }

    /// Restore a keypair from a raw 32-byte secret (e.g. loaded from a
    /// wallet keyfile).
    pub fn from_raw(secret_bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let secret =
            libsecp256k1::SecretKey::parse(&secret_bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = libsecp256k1::PublicKey::from_secret_key(&secret);
        Ok(Self {
            address: address_from_pubkey(&public),
            secret: Zeroizing::new(secret_bytes),
        })
    }

    pub fn secret_key(&self) -> Result<libsecp256k1::SecretKey, CryptoError> {
        libsecp256k1::SecretKey::parse(&self.secret).map_err(|_| CryptoError::InvalidSecretKey)
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Sign a 32-byte digest, producing a recoverable signature over it.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<helix_core::types::RecoverableSignature, CryptoError> {
        let secret = self.secret_key()?;
        Ok(sign_hash(&secret, digest))
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair {{ address: {:?} }}", self.address)
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keypair_signs_and_recovers() {
        let keypair = SigningKeyPair::generate();
        let digest = helix_core::hash_bytes(b"helix");
        let signature = keypair.sign(&digest).unwrap();
        let recovered = crate::sign::recover_sender(&digest, &signature).unwrap();
        assert_eq!(recovered, keypair.address);
    }

    #[test]
    fn from_raw_reproduces_same_address() {
        let keypair = SigningKeyPair::generate();
        let restored = SigningKeyPair::from_raw(*keypair.secret_bytes()).unwrap();
        assert_eq!(keypair.address, restored.address);
    }
}
