//! UTXO adapter against an in-memory node.

use bitcoin::absolute::LockTime;
use bitcoin::script::PushBytesBuf;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount as Sats, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};
use futures_util::TryStreamExt;
use std::sync::Arc;
use tandem_adapters::{
    ChainAdapter, ChainError, Funding, ProposalFilter, SignedTx, UtxoChainAdapter,
    UtxoChainConfig,
};
use tandem_assets::AssetCodec;
use tandem_codec::{ProposalCodec, VoteCodec, PAYLOAD_VERSION};
use tandem_nullables::{NullClock, NullMembership, NullUtxoChain};
use tandem_store::MembershipAsset;
use tandem_types::{
    Amount, AssetId, Ballot, Chain, ErrorKind, FlowDirection, Proposal, ProposalBody, ProposalId,
    ScriptType, Timestamp, UtxoAction, VoteWindow,
};
use tandem_wallet_core::{KeyHandle, LocalSigner};

const SECRET: [u8; 32] = [0x11; 32];

fn key() -> KeyHandle {
    KeyHandle::from_secret_bytes(&SECRET).unwrap()
}

fn treasury() -> Address {
    key().p2wpkh_address(Network::Regtest)
}

fn voter_key(seed: u8) -> KeyHandle {
    KeyHandle::from_secret_bytes(&[seed; 32]).unwrap()
}

fn voter(seed: u8) -> Address {
    voter_key(seed).p2wpkh_address(Network::Regtest)
}

const ALICE: u8 = 0x21;
const BOB: u8 = 0x22;

struct Fixture {
    chain: Arc<NullUtxoChain>,
    adapter: UtxoChainAdapter,
}

fn fixture() -> Fixture {
    fixture_on(NullUtxoChain::new().auto_mine())
}

/// Treasury funded, with alice and bob voting from their own funded
/// wallets.
fn fixture_on(chain: NullUtxoChain) -> Fixture {
    let chain = Arc::new(chain);
    chain.fund(treasury().script_pubkey(), 100_000);
    let config = UtxoChainConfig::new(
        "http://127.0.0.1:18443",
        Network::Regtest,
        treasury().to_string(),
    );
    let adapter = UtxoChainAdapter::new(config, chain.clone())
        .unwrap()
        .with_funding(Funding {
            address: treasury(),
            backend: Arc::new(LocalSigner::new(key())),
        })
        .with_voter(Funding {
            address: voter(ALICE),
            backend: Arc::new(LocalSigner::new(voter_key(ALICE))),
        })
        .with_voter(Funding {
            address: voter(BOB),
            backend: Arc::new(LocalSigner::new(voter_key(BOB))),
        });
    for seed in [ALICE, BOB] {
        chain.fund(voter(seed).script_pubkey(), 50_000);
    }
    Fixture { chain, adapter }
}

fn ballot(id: ProposalId, voter: String, option_index: u8) -> Ballot {
    Ballot {
        proposal_id: id,
        voter,
        option_index,
        weight: Amount::new(10),
    }
}

async fn submit(f: &Fixture, proposal: &Proposal) {
    f.adapter
        .submit_proposal(&ProposalCodec::default().encode(proposal).unwrap())
        .await
        .unwrap();
}

fn proposal(title: &str) -> Proposal {
    ProposalCodec::default()
        .new_utxo_proposal(
            treasury().to_string(),
            ProposalBody {
                title: title.into(),
                description: "fund the relay operators".into(),
                options: vec!["Yes".into(), "No".into()],
                start_time: Timestamp::new(1_700_000_000),
                end_time: Some(Timestamp::new(1_700_600_000)),
            },
            UtxoAction::Signal,
        )
        .unwrap()
}

fn data_tx(payload: &[u8], nonce: u8) -> Transaction {
    let push = PushBytesBuf::try_from(payload.to_vec()).unwrap();
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::from_bytes(vec![nonce]),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Sats::ZERO,
            script_pubkey: ScriptBuf::new_op_return(push),
        }],
    }
}

#[tokio::test]
async fn submitted_proposal_is_fetched_back() {
    let f = fixture();
    let proposal = proposal("relay grants");
    let encoded = ProposalCodec::default().encode(&proposal).unwrap();

    let tx = f.adapter.submit_proposal(&encoded).await.unwrap();
    assert_eq!(tx.chain, Chain::Utxo);
    assert_eq!(f.chain.broadcasts().len(), 1);

    let fetched: Vec<Proposal> = f
        .adapter
        .fetch_proposals(ProposalFilter::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(fetched, vec![proposal]);
}

#[tokio::test]
async fn filter_bounds_the_scanned_heights() {
    let f = fixture();
    let codec = ProposalCodec::default();
    let first = proposal("first");
    let second = proposal("second");
    f.adapter.submit_proposal(&codec.encode(&first).unwrap()).await.unwrap();
    let second_height = f.chain.height() + 1;
    f.adapter.submit_proposal(&codec.encode(&second).unwrap()).await.unwrap();

    let later: Vec<Proposal> = f
        .adapter
        .fetch_proposals(ProposalFilter {
            start: Some(second_height),
            ..Default::default()
        })
        .try_collect()
        .await
        .unwrap();
    assert_eq!(later, vec![second]);
}

#[tokio::test]
async fn oversized_payload_is_refused_before_broadcast() {
    let f = fixture();
    let roomy = ProposalCodec::new(tandem_codec::PayloadLimits {
        utxo: 4096,
        ..Default::default()
    });
    let big = roomy
        .new_utxo_proposal(
            treasury().to_string(),
            ProposalBody {
                title: "big".into(),
                description: "x".repeat(600),
                options: vec!["Yes".into(), "No".into()],
                start_time: Timestamp::new(1_700_000_000),
                end_time: None,
            },
            UtxoAction::Signal,
        )
        .unwrap();
    let encoded = roomy.encode(&big).unwrap();
    let err = f.adapter.submit_proposal(&encoded).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
    assert!(f.chain.broadcasts().is_empty());
}

#[tokio::test]
async fn undecodable_payloads_are_skipped_and_counted() {
    let f = fixture();
    let good = proposal("good");
    let tag = Chain::Utxo.tag_nibble() << 4;
    f.chain.push_block(vec![
        data_tx(&[PAYLOAD_VERSION, tag, 0xff, 0xff], 1),
        data_tx(b"hello, world", 2),
        data_tx(&ProposalCodec::default().encode(&good).unwrap(), 3),
    ]);

    let fetched: Vec<Proposal> = f
        .adapter
        .fetch_proposals(ProposalFilter::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(fetched, vec![good]);
    // The foreign data output is not a governance payload at all.
    assert_eq!(f.adapter.skipped_payloads(), 1);
}

#[tokio::test]
async fn votes_come_back_in_chain_order() {
    let f = fixture();
    let proposal = proposal("vote order");
    submit(&f, &proposal).await;
    let id = proposal.id().unwrap();
    let (alice, bob) = (voter(ALICE).to_string(), voter(BOB).to_string());
    for (who, option) in [(&alice, 0u8), (&bob, 1), (&alice, 1)] {
        f.adapter
            .cast_vote(&id, &ballot(id, who.clone(), option))
            .await
            .unwrap();
    }

    let votes = f
        .adapter
        .fetch_votes(&proposal, &VoteWindow::UNBOUNDED)
        .await
        .unwrap()
        .votes;
    let seen: Vec<(&str, &str)> = votes
        .iter()
        .map(|v| (v.voter.as_str(), v.option.as_str()))
        .collect();
    assert_eq!(
        seen,
        vec![
            (alice.as_str(), "Yes"),
            (bob.as_str(), "No"),
            (alice.as_str(), "No")
        ]
    );
    assert!(votes
        .windows(2)
        .all(|w| w[0].witness.position < w[1].witness.position));
}

#[tokio::test]
async fn votes_need_the_voters_own_wallet() {
    let f = fixture();
    let proposal = proposal("wallets");
    submit(&f, &proposal).await;
    let id = proposal.id().unwrap();
    let before = f.chain.broadcasts().len();

    let carol = voter(0x23).to_string();
    let err = f
        .adapter
        .cast_vote(&id, &ballot(id, carol, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let junk = f
        .adapter
        .cast_vote(&id, &ballot(id, "alice".into(), 0))
        .await
        .unwrap_err();
    assert_eq!(junk.kind(), ErrorKind::Validation);
    assert_eq!(f.chain.broadcasts().len(), before);
}

#[tokio::test]
async fn votes_not_funded_by_their_voter_are_skipped() {
    let f = fixture();
    let proposal = proposal("forgery");
    submit(&f, &proposal).await;
    let id = proposal.id().unwrap();
    let alice = voter(ALICE).to_string();
    let codec = VoteCodec::default();

    // Spends one of bob's outputs while naming alice.
    let bobs_coin = f.chain.fund(voter(BOB).script_pubkey(), 1_000);
    let mut spoofed = data_tx(&codec.encode(&ballot(id, alice.clone(), 1)).unwrap(), 1);
    spoofed.input[0].previous_output = bobs_coin;
    // No real input at all.
    let unfunded = data_tx(&codec.encode(&ballot(id, alice.clone(), 1)).unwrap(), 2);
    // Not an address on this network.
    let junk = data_tx(&codec.encode(&ballot(id, "mallory".into(), 1)).unwrap(), 3);
    f.chain.push_block(vec![spoofed, unfunded, junk]);
    f.adapter
        .cast_vote(&id, &ballot(id, alice.clone(), 0))
        .await
        .unwrap();

    let votes = f
        .adapter
        .fetch_votes(&proposal, &VoteWindow::UNBOUNDED)
        .await
        .unwrap()
        .votes;
    assert_eq!(votes.len(), 1);
    assert_eq!((votes[0].voter.as_str(), votes[0].option.as_str()), (alice.as_str(), "Yes"));
    assert_eq!(f.adapter.skipped_payloads(), 3);
}

#[tokio::test]
async fn votes_outside_the_window_are_left_out() {
    let clock = Arc::new(NullClock::new(1_000));
    let f = fixture_on(NullUtxoChain::new().auto_mine().with_clock(clock.clone()));
    let proposal = proposal("window");
    submit(&f, &proposal).await;
    let id = proposal.id().unwrap();
    let (alice, bob) = (voter(ALICE).to_string(), voter(BOB).to_string());
    let window = VoteWindow::new(Timestamp::new(1_100), Timestamp::new(2_000));

    f.adapter.cast_vote(&id, &ballot(id, bob.clone(), 0)).await.unwrap();
    clock.set(1_500);
    f.adapter.cast_vote(&id, &ballot(id, alice.clone(), 0)).await.unwrap();
    let inside = f.chain.height();

    let open = f.adapter.fetch_votes(&proposal, &window).await.unwrap();
    assert!(!open.settled);
    assert_eq!(open.cutoff, Some(inside));

    clock.set(2_000);
    f.adapter.cast_vote(&id, &ballot(id, alice.clone(), 1)).await.unwrap();
    let closed = f.adapter.fetch_votes(&proposal, &window).await.unwrap();
    assert!(closed.settled);
    assert_eq!(closed.cutoff, Some(inside));
    let seen: Vec<(&str, &str)> = closed
        .votes
        .iter()
        .map(|v| (v.voter.as_str(), v.option.as_str()))
        .collect();
    assert_eq!(seen, vec![(alice.as_str(), "Yes")]);
}

#[tokio::test]
async fn treasury_flows_net_out_change() {
    let clock = Arc::new(NullClock::new(1_000));
    let f = fixture_on(NullUtxoChain::new().auto_mine().with_clock(clock.clone()));
    clock.set(2_000);
    submit(&f, &proposal("costs a fee")).await;
    clock.set(3_000);
    f.chain.fund(treasury().script_pubkey(), 5_000);

    let payload_tx = &f.chain.broadcasts()[0];
    let change: u64 = payload_tx
        .output
        .iter()
        .filter(|o| o.script_pubkey == treasury().script_pubkey())
        .map(|o| o.value.to_sat())
        .sum();
    let flows = f
        .adapter
        .treasury_flows(Timestamp::new(0), Timestamp::new(u64::MAX))
        .await
        .unwrap();
    let seen: Vec<(FlowDirection, Amount, u64)> = flows
        .iter()
        .map(|f| (f.direction, f.amount, f.time.as_secs()))
        .collect();
    assert_eq!(
        seen,
        vec![
            (FlowDirection::Income, Amount::new(100_000), 1_000),
            (FlowDirection::Expense, Amount::from(100_000 - change), 2_000),
            (FlowDirection::Income, Amount::new(5_000), 3_000),
        ]
    );

    let later = f
        .adapter
        .treasury_flows(Timestamp::new(2_500), Timestamp::new(u64::MAX))
        .await
        .unwrap();
    assert_eq!(later.len(), 1);
    assert!(later[0].is_income());
}

#[tokio::test]
async fn votes_for_other_chains_are_refused() {
    let f = fixture();
    let id = ProposalId::Contract(3);
    let ballot = Ballot {
        proposal_id: id,
        voter: voter(ALICE).to_string(),
        option_index: 0,
        weight: Amount::new(1),
    };
    assert!(matches!(
        f.adapter.cast_vote(&id, &ballot).await,
        Err(ChainError::WrongChain(_))
    ));
}

#[tokio::test]
async fn registered_commitments_count_as_assets() {
    let f = fixture();
    let asset_id = AssetId::new([0x42; 32]);
    let commitment = AssetCodec
        .build_commitment(asset_id, Amount::new(500), b"", key().x_only_public_key())
        .unwrap();
    f.chain.fund(commitment.script_pubkey(), 546);

    let before = f.adapter.get_balance(&treasury().to_string()).await.unwrap();
    assert_eq!(before.asset(&asset_id), Amount::ZERO);
    assert_eq!(before.native, Amount::new(100_000));

    f.adapter
        .register_commitments(&[commitment.leaf_script().to_owned()])
        .unwrap();
    let utxos = f.adapter.list_unspent(&treasury().to_string()).await.unwrap();
    assert_eq!(utxos.len(), 2);
    assert!(utxos
        .iter()
        .any(|u| u.script_type == ScriptType::AssetCommitment));

    let after = f.adapter.get_balance(&treasury().to_string()).await.unwrap();
    assert_eq!(after.asset(&asset_id), Amount::new(500));
    assert_eq!(after.native, Amount::new(100_000));
}

#[tokio::test]
async fn membership_uses_the_configured_source() {
    let f = fixture();
    let source = Arc::new(NullMembership::new());
    source.set_balance("alice", MembershipAsset::Native, Amount::new(5));
    let adapter = f.adapter.with_membership(source.clone());
    assert!(adapter.is_member("alice", Amount::new(5)).await.unwrap());
    assert!(!adapter.is_member("alice", Amount::new(6)).await.unwrap());
    assert!(!adapter.is_member("bob", Amount::new(1)).await.unwrap());

    source.set_unavailable(true);
    let err = adapter.is_member("alice", Amount::new(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainUnavailable);
}

#[tokio::test]
async fn on_chain_membership_reads_the_native_balance() {
    let f = fixture();
    let treasury = treasury().to_string();
    assert!(f.adapter.is_member(&treasury, Amount::new(100_000)).await.unwrap());
    assert!(!f.adapter.is_member(&treasury, Amount::new(100_001)).await.unwrap());
}

#[tokio::test]
async fn rejected_broadcast_is_classified() {
    let f = fixture();
    f.chain.fail_next_broadcast("min relay fee not met, 100 < 141");
    let err = f
        .adapter
        .broadcast(&SignedTx::Utxo(data_tx(b"x", 9)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Broadcast);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn contract_transactions_are_refused() {
    let f = fixture();
    let err = f
        .adapter
        .broadcast(&SignedTx::Contract(vec![0xf8]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unreachable_node_is_retryable() {
    let f = fixture();
    f.chain.set_offline(true);
    let err = f
        .adapter
        .get_balance(&treasury().to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainUnavailable);
    assert!(err.is_retryable());
}
