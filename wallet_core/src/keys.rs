//! Hierarchical deterministic key derivation.

use crate::error::DerivationError;
use crate::mnemonic::Seed;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::key::{CompressedPublicKey, XOnlyPublicKey};
use bitcoin::secp256k1::{All, Keypair, PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, Network};
use std::str::FromStr;
use zeroize::Zeroizing;

/// Default treasury signing path (BIP84 account 0, first receive key).
pub const DEFAULT_TREASURY_PATH: &str = "m/84'/0'/0'/0/0";

/// A derived private key. The secret bytes are wiped on drop.
pub struct KeyHandle {
    secret: Zeroizing<[u8; 32]>,
    public: PublicKey,
    path: Option<DerivationPath>,
}

impl KeyHandle {
    /// Wrap raw secret bytes, e.g. recovered from a keystore.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, DerivationError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| DerivationError::InvalidSeed(e.to_string()))?;
        let secp = Secp256k1::signing_only();
        Ok(Self {
            secret: Zeroizing::new(secret.secret_bytes()),
            public: secret.public_key(&secp),
            path: None,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.public.x_only_public_key().0
    }

    pub fn path(&self) -> Option<&DerivationPath> {
        self.path.as_ref()
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    pub(crate) fn secret_key(&self) -> Result<SecretKey, DerivationError> {
        SecretKey::from_slice(&self.secret[..])
            .map_err(|e| DerivationError::InvalidSeed(e.to_string()))
    }

    pub(crate) fn keypair(&self, secp: &Secp256k1<All>) -> Result<Keypair, DerivationError> {
        Ok(Keypair::from_secret_key(secp, &self.secret_key()?))
    }

    /// Native segwit address for this key.
    pub fn p2wpkh_address(&self, network: Network) -> Address {
        Address::p2wpkh(&CompressedPublicKey(self.public), network)
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("public", &self.public)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Derives signing keys from seeds.
pub struct KeyManager {
    network: Network,
    secp: Secp256k1<All>,
}

impl KeyManager {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            secp: Secp256k1::new(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Derive the key at `path` (e.g. `m/84'/0'/0'/0/3`) below `seed`.
    pub fn derive(&self, seed: &Seed, path: &str) -> Result<KeyHandle, DerivationError> {
        let parsed = DerivationPath::from_str(path).map_err(|e| DerivationError::InvalidPath {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let master = Xpriv::new_master(self.network, seed.as_bytes())
            .map_err(|e| DerivationError::InvalidSeed(e.to_string()))?;
        let child = master
            .derive_priv(&self.secp, &parsed)
            .map_err(|e| DerivationError::InvalidPath {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(KeyHandle {
            secret: Zeroizing::new(child.private_key.secret_bytes()),
            public: child.private_key.public_key(&self.secp),
            path: Some(parsed),
        })
    }
}
