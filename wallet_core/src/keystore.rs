//! Argon2id encrypted keystore for signing secrets.
//!
//! Encrypts secret bytes (a 32-byte private key or a 64-byte seed) with a
//! user-chosen password:
//! 1. Argon2id derives a 32-byte encryption key from the password + random salt
//! 2. AES-256-GCM encrypts the secret with a random nonce
//! 3. The result is stored as a JSON file with all parameters for future decryption
//!
//! Decryption honours the stored KDF parameters but refuses anything below
//! [`MIN_KDF_ITERATIONS`].

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::Zeroizing;

use crate::error::{DecryptionError, WalletError};

const KEYSTORE_VERSION: u32 = 1;

/// Argon2id parameters: 64 MB memory, 3 iterations, 1 lane of parallelism.
const ARGON2_MEMORY_KIB: u32 = 65536; // 64 MB
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

pub const MIN_KDF_ITERATIONS: u32 = ARGON2_ITERATIONS;

/// Salt length in bytes.
const SALT_LEN: usize = 32;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;

/// What the encrypted secret is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    PrivateKey,
    Seed,
}

/// The top-level keystore file structure, serializable to/from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreFile {
    pub version: u32,
    pub kind: SecretKind,
    /// Optional public identifier (address or x-only key) for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub crypto: KeystoreCrypto,
}

/// The crypto section of the keystore, containing all encryption parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreCrypto {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    /// Hex-encoded salt.
    pub salt: String,
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
}

/// KDF parameters for Argon2id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory: ARGON2_MEMORY_KIB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

/// Encrypt `secret` with a password using Argon2id + AES-256-GCM.
pub fn encrypt_keystore(
    secret: &[u8],
    kind: SecretKind,
    password: &str,
) -> Result<KeystoreFile, WalletError> {
    encrypt_with_params(secret, kind, password, KdfParams::default())
}

/// As [`encrypt_keystore`], with explicit KDF cost.
pub fn encrypt_with_params(
    secret: &[u8],
    kind: SecretKind,
    password: &str,
    kdf_params: KdfParams,
) -> Result<KeystoreFile, WalletError> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).map_err(|e| WalletError::Encryption(e.to_string()))?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce_bytes).map_err(|e| WalletError::Encryption(e.to_string()))?;

    let derived_key = derive_key(password, &salt, &kdf_params)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(derived_key.as_slice())
        .map_err(|e| WalletError::Encryption(format!("AES key init failed: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, secret)
        .map_err(|e| WalletError::Encryption(format!("encryption failed: {}", e)))?;

    Ok(KeystoreFile {
        version: KEYSTORE_VERSION,
        kind,
        label: None,
        crypto: KeystoreCrypto {
            cipher: "aes-256-gcm".to_string(),
            kdf: "argon2id".to_string(),
            kdf_params,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        },
    })
}

/// Decrypt a keystore file with the given password.
pub fn decrypt_keystore(
    keystore: &KeystoreFile,
    password: &str,
) -> Result<Zeroizing<Vec<u8>>, DecryptionError> {
    if keystore.version != KEYSTORE_VERSION {
        return Err(DecryptionError::UnsupportedVersion(keystore.version));
    }
    let crypto = &keystore.crypto;
    if crypto.cipher != "aes-256-gcm" {
        return Err(DecryptionError::Unsupported {
            field: "cipher",
            value: crypto.cipher.clone(),
        });
    }
    if crypto.kdf != "argon2id" {
        return Err(DecryptionError::Unsupported {
            field: "kdf",
            value: crypto.kdf.clone(),
        });
    }
    if crypto.kdf_params.iterations < MIN_KDF_ITERATIONS {
        return Err(DecryptionError::WeakKdf(crypto.kdf_params.iterations));
    }

    let salt = decode_field("salt", &crypto.salt)?;
    let nonce_bytes = decode_field("nonce", &crypto.nonce)?;
    let ciphertext = decode_field("ciphertext", &crypto.ciphertext)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(DecryptionError::Malformed {
            field: "nonce",
            reason: format!("expected {} bytes, got {}", NONCE_LEN, nonce_bytes.len()),
        });
    }

    let derived_key = derive_key(password, &salt, &crypto.kdf_params)?;
    let cipher = Aes256Gcm::new_from_slice(derived_key.as_slice()).map_err(|e| {
        DecryptionError::Malformed {
            field: "kdf_params",
            reason: e.to_string(),
        }
    })?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| DecryptionError::Authentication)?;
    Ok(Zeroizing::new(plaintext))
}

/// Save a keystore to a JSON file.
pub fn save_keystore(keystore: &KeystoreFile, path: &Path) -> Result<(), WalletError> {
    let json = serde_json::to_string_pretty(keystore)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a keystore from a JSON file.
pub fn load_keystore(path: &Path) -> Result<KeystoreFile, WalletError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Derive a 32-byte key from a password and salt using Argon2id.
fn derive_key(
    password: &str,
    salt: &[u8],
    kdf: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, DecryptionError> {
    let malformed = |e: argon2::Error| DecryptionError::Malformed {
        field: "kdf_params",
        reason: e.to_string(),
    };
    let params = Params::new(
        kdf.memory,
        kdf.iterations,
        kdf.parallelism,
        Some(ARGON2_OUTPUT_LEN),
    )
    .map_err(malformed)?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, output.as_mut_slice())
        .map_err(malformed)?;
    Ok(output)
}

fn decode_field(field: &'static str, value: &str) -> Result<Vec<u8>, DecryptionError> {
    hex::decode(value).map_err(|e| DecryptionError::Malformed {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cheap KDF cost for tests; still at the iteration floor.
    fn fast() -> KdfParams {
        KdfParams {
            memory: 1024,
            iterations: MIN_KDF_ITERATIONS,
            parallelism: 1,
        }
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let secret = [42u8; 32];
        let keystore =
            encrypt_with_params(&secret, SecretKind::PrivateKey, "test-password-123", fast())
                .unwrap();
        let decrypted = decrypt_keystore(&keystore, "test-password-123").unwrap();
        assert_eq!(decrypted.as_slice(), &secret);
    }

    #[test]
    fn wrong_password_is_a_decryption_error() {
        let keystore =
            encrypt_with_params(&[42u8; 32], SecretKind::PrivateKey, "correct", fast()).unwrap();
        assert_eq!(
            decrypt_keystore(&keystore, "wrong").unwrap_err(),
            DecryptionError::Authentication
        );
    }

    #[test]
    fn tampered_ciphertext_never_decrypts() {
        let mut keystore =
            encrypt_with_params(&[5u8; 64], SecretKind::Seed, "pw", fast()).unwrap();
        let mut bytes = hex::decode(&keystore.crypto.ciphertext).unwrap();
        bytes[0] ^= 0xFF;
        keystore.crypto.ciphertext = hex::encode(bytes);
        assert_eq!(
            decrypt_keystore(&keystore, "pw").unwrap_err(),
            DecryptionError::Authentication
        );
    }

    #[test]
    fn weak_kdf_is_refused() {
        let mut keystore =
            encrypt_with_params(&[1u8; 32], SecretKind::PrivateKey, "pw", fast()).unwrap();
        keystore.crypto.kdf_params.iterations = 1;
        assert_eq!(
            decrypt_keystore(&keystore, "pw").unwrap_err(),
            DecryptionError::WeakKdf(1)
        );
    }

    #[test]
    fn default_params_are_recorded() {
        let keystore = encrypt_keystore(&[0u8; 32], SecretKind::PrivateKey, "pass").unwrap();
        assert_eq!(keystore.version, 1);
        assert_eq!(keystore.crypto.cipher, "aes-256-gcm");
        assert_eq!(keystore.crypto.kdf, "argon2id");
        assert_eq!(keystore.crypto.kdf_params, KdfParams::default());
        assert_eq!(keystore.crypto.kdf_params.memory, 65536);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treasury.json");
        let keystore =
            encrypt_with_params(&[99u8; 32], SecretKind::PrivateKey, "file-test", fast()).unwrap();

        save_keystore(&keystore, &path).unwrap();
        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"kind\": \"private_key\""));

        let loaded = load_keystore(&path).unwrap();
        let decrypted = decrypt_keystore(&loaded, "file-test").unwrap();
        assert_eq!(decrypted.as_slice(), &[99u8; 32]);
    }

    #[test]
    fn salts_differ_between_encryptions() {
        let a = encrypt_with_params(&[7u8; 32], SecretKind::PrivateKey, "pw", fast()).unwrap();
        let b = encrypt_with_params(&[7u8; 32], SecretKind::PrivateKey, "pw", fast()).unwrap();
        assert_ne!(a.crypto.salt, b.crypto.salt);
        assert_ne!(a.crypto.ciphertext, b.crypto.ciphertext);
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut keystore =
            encrypt_with_params(&[0u8; 32], SecretKind::PrivateKey, "pass", fast()).unwrap();
        keystore.version = 99;
        assert_eq!(
            decrypt_keystore(&keystore, "pass").unwrap_err(),
            DecryptionError::UnsupportedVersion(99)
        );
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_keystore(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(WalletError::Io(_))));
    }
}
