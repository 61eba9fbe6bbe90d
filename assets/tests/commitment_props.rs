use bitcoin::key::XOnlyPublicKey;
use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};
use proptest::prelude::*;
use tandem_assets::{AssetCodec, MAX_METADATA_BYTES};
use tandem_types::{Amount, AssetId};

fn arb_owner() -> impl Strategy<Value = XOnlyPublicKey> {
    any::<[u8; 32]>().prop_filter_map("valid secret key", |bytes| {
        let secp = Secp256k1::new();
        SecretKey::from_slice(&bytes)
            .ok()
            .map(|sk| Keypair::from_secret_key(&secp, &sk).x_only_public_key().0)
    })
}

proptest! {
    #[test]
    fn parse_inverts_build(
        id in any::<[u8; 32]>(),
        amount in 1u128..=u128::MAX,
        metadata in prop::collection::vec(any::<u8>(), 0..=MAX_METADATA_BYTES)
            .prop_filter("opcode-sized metadata", |m| !matches!(m.as_slice(), [0x01..=0x10 | 0x81])),
        owner in arb_owner(),
    ) {
        let codec = AssetCodec;
        let built = codec
            .build_commitment(AssetId::new(id), Amount::new(amount), &metadata, owner)
            .unwrap();
        let parsed = codec.parse_commitment(built.leaf_script()).unwrap();
        prop_assert_eq!(parsed.asset_id, AssetId::new(id));
        prop_assert_eq!(parsed.amount, Amount::new(amount));
        prop_assert_eq!(parsed.metadata, metadata);
        prop_assert_eq!(parsed.owner, owner);
    }

    #[test]
    fn leaf_pushes_are_minimal(
        metadata in prop::collection::vec(any::<u8>(), 0..=3),
        owner in arb_owner(),
    ) {
        let built = AssetCodec.build_commitment(AssetId::new([1; 32]), Amount::new(1), &metadata, owner);
        if let Ok(built) = built {
            prop_assert!(built.leaf_script().instructions_minimal().all(|i| i.is_ok()));
        }
    }

    #[test]
    fn parse_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..400)) {
        let _ = AssetCodec.parse_commitment(bitcoin::Script::from_bytes(&bytes));
    }
}
