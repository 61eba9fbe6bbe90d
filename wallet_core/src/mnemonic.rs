//! BIP39 mnemonic generation and seed derivation.
//!
//! Phrases are 24 words (256-bit entropy). The 64-byte seed feeds
//! [`crate::KeyManager::derive`].

use crate::error::DerivationError;
use bip39::Mnemonic;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A BIP39 seed. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 64]);

impl Seed {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seed(..)")
    }
}

/// Generate a new 24-word mnemonic from OS entropy.
pub fn generate_mnemonic() -> Result<String, DerivationError> {
    let mut entropy = [0u8; 32];
    getrandom::getrandom(&mut entropy).map_err(|e| DerivationError::Entropy(e.to_string()))?;
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()));
    entropy.zeroize();
    Ok(mnemonic?.to_string())
}

/// Seed for `phrase` with an optional BIP39 passphrase.
pub fn seed_from_mnemonic(phrase: &str, passphrase: &str) -> Result<Seed, DerivationError> {
    let mnemonic = Mnemonic::parse_normalized(phrase)
        .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?;
    Ok(Seed(mnemonic.to_seed_normalized(passphrase)))
}

pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_normalized(phrase).is_ok()
}
