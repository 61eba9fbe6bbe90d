use crate::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tandem_types::{Amount, AssetId, EvmAddress};

/// What a membership balance is measured in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipAsset {
    Native,
    /// A UTXO-chain asset carried in commitments.
    Asset(AssetId),
    /// A token contract on the contract chain.
    Token(EvmAddress),
}

/// Admission source consumed by the adapters' `is_member` gate.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn balance_of(&self, address: &str, asset: MembershipAsset)
        -> Result<Amount, StoreError>;
}
