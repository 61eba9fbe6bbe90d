//! Key management and signing for the governance treasury.
//!
//! - BIP39 mnemonics and seeds ([`mnemonic`])
//! - BIP32 derivation into zeroizing key handles ([`KeyManager`])
//! - Argon2id + AES-256-GCM keystore files ([`keystore`])
//! - Per-input signing for legacy, wrapped-segwit, native-segwit and
//!   asset-commitment outputs ([`Signer`]), with local or external backends

pub mod error;
pub mod external;
pub mod keys;
pub mod keystore;
pub mod mnemonic;
pub mod signer;

pub use error::{DecryptionError, DerivationError, WalletError};
pub use external::{DeviceRequest, ExternalSigner};
pub use keys::{KeyHandle, KeyManager, DEFAULT_TREASURY_PATH};
pub use keystore::{
    decrypt_keystore, encrypt_keystore, load_keystore, save_keystore, KeystoreFile, SecretKind,
};
pub use mnemonic::{generate_mnemonic, seed_from_mnemonic, Seed};
pub use signer::{
    InputSignature, LocalSigner, ProducedSignature, SignRequest, SignatureScheme, Signer,
    SigningBackend,
};
