pub mod error;
pub mod keypair;
pub mod sign;
pub mod vrf;

pub use error::CryptoError;
pub use keypair::SigningKeyPair;
pub use sign::{address_from_pubkey, recover_sender, sign_hash, verify_sender};
pub use vrf::{vrf_seed, VrfKeyPair};
