//! Treasury execution against in-memory chains.

use bitcoin::{Address, Network};
use std::sync::Arc;
use tandem_adapters::{
    ChainAdapter, ContractChainAdapter, ContractChainConfig, UtxoChainAdapter, UtxoChainConfig,
};
use tandem_assets::AssetCodec;
use tandem_codec::ProposalCodec;
use tandem_governance::StatusBoard;
use tandem_nullables::{NullClock, NullContractChain, NullLedger, NullUtxoChain};
use tandem_store::{GovernanceLedger, GovernanceStore};
use tandem_treasury::{TreasuryConfig, TreasuryError, TreasuryManager, UtxoWallet};
use tandem_types::{
    Amount, AssetId, Chain, ContractAction, ErrorKind, EvmAddress, FlowDirection, Proposal,
    ProposalBody, ProposalId, ProposalStatus, Timestamp, UtxoAction,
};
use tandem_wallet_core::{KeyHandle, LocalSigner};

const NOW: u64 = 1_700_000_000;
const DAO: EvmAddress = EvmAddress::new([0xda; 20]);

fn treasury_key() -> KeyHandle {
    KeyHandle::from_secret_bytes(&[0x33; 32]).unwrap()
}

fn recipient_key() -> KeyHandle {
    KeyHandle::from_secret_bytes(&[0x44; 32]).unwrap()
}

fn treasury() -> Address {
    treasury_key().p2wpkh_address(Network::Regtest)
}

fn recipient() -> Address {
    recipient_key().p2wpkh_address(Network::Regtest)
}

fn executor_address() -> Address {
    KeyHandle::from_secret_bytes(&[0x66; 32])
        .unwrap()
        .p2wpkh_address(Network::Regtest)
}

/// A member allowed to trigger execution on the UTXO chain.
fn executor() -> String {
    executor_address().to_string()
}

fn fund_executor(chain: &NullUtxoChain) {
    chain.fund(executor_address().script_pubkey(), 5_000);
}

/// Contract-chain member allowed to trigger execution.
const CONTRACT_EXECUTOR: EvmAddress = EvmAddress::new([0x5e; 20]);

fn body(title: &str) -> ProposalBody {
    ProposalBody {
        title: title.into(),
        description: String::new(),
        options: vec!["Yes".into(), "No".into()],
        start_time: Timestamp::new(NOW - 7_200),
        end_time: Some(Timestamp::new(NOW - 3_600)),
    }
}

/// Store `proposal` and walk it to `Passed`.
fn pass(ledger: &Arc<NullLedger>, proposal: &Proposal) -> ProposalId {
    let ledger: Arc<dyn GovernanceLedger> = ledger.clone();
    let id = GovernanceStore::new(ledger.clone())
        .put_proposal(proposal)
        .unwrap();
    let board = StatusBoard::new(ledger);
    board.register(&id).unwrap();
    let at = Timestamp::new(NOW);
    board
        .transition(&id, ProposalStatus::Draft, ProposalStatus::Active, at, None)
        .unwrap();
    board
        .transition(&id, ProposalStatus::Active, ProposalStatus::Passed, at, None)
        .unwrap();
    id
}

struct Utxo {
    chain: Arc<NullUtxoChain>,
    ledger: Arc<NullLedger>,
    adapter: Arc<UtxoChainAdapter>,
    manager: Arc<TreasuryManager>,
}

fn utxo() -> Utxo {
    let chain = Arc::new(NullUtxoChain::new().auto_mine());
    chain.fund(treasury().script_pubkey(), 100_000);
    fund_executor(&chain);
    let config = UtxoChainConfig::new("http://127.0.0.1:18443", Network::Regtest, treasury().to_string());
    let adapter = Arc::new(UtxoChainAdapter::new(config, chain.clone()).unwrap());
    let ledger = Arc::new(NullLedger::new());
    let manager = TreasuryManager::new(
        ledger.clone(),
        TreasuryConfig::default(),
        Arc::new(NullClock::new(NOW)),
    )
    .unwrap()
    .with_adapter(adapter.clone())
    .with_utxo_wallet(UtxoWallet {
        address: treasury(),
        network: Network::Regtest,
        backend: Arc::new(LocalSigner::new(treasury_key())),
    });
    Utxo {
        chain,
        ledger,
        adapter,
        manager: Arc::new(manager),
    }
}

fn utxo_proposal(title: &str, action: UtxoAction) -> Proposal {
    ProposalCodec::default()
        .new_utxo_proposal(treasury().to_string(), body(title), action)
        .unwrap()
}

fn spend(amount: u128) -> UtxoAction {
    UtxoAction::Spend {
        recipient: recipient().to_string(),
        amount: Amount::new(amount),
    }
}

fn history(ledger: &Arc<NullLedger>, id: &ProposalId) -> Vec<ProposalStatus> {
    StatusBoard::new(ledger.clone())
        .history(id)
        .unwrap()
        .into_iter()
        .map(|e| e.to)
        .collect()
}

#[tokio::test]
async fn passed_spend_is_paid_once() {
    let t = utxo();
    let id = pass(&t.ledger, &utxo_proposal("Pay the auditors", spend(30_000)));

    let result = t.manager.execute(&executor(), &id).await.unwrap();
    assert_eq!(result.status, ProposalStatus::Executed);
    assert_eq!(result.chain, Chain::Utxo);
    assert!(result.tx.is_some());
    assert!(result.fee.is_some_and(|fee| !fee.is_zero()));

    let paid = t.adapter.get_balance(&recipient().to_string()).await.unwrap();
    assert_eq!(paid.native, Amount::new(30_000));
    assert_eq!(t.chain.broadcasts().len(), 1);

    let again = t.manager.execute(&executor(), &id).await.unwrap_err();
    assert!(matches!(again, TreasuryError::AlreadyExecuted(_)));
    assert_eq!(again.kind(), ErrorKind::AlreadyExecuted);
    assert_eq!(t.chain.broadcasts().len(), 1);

    assert_eq!(
        history(&t.ledger, &id).last(),
        Some(&ProposalStatus::Executed)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_executors_broadcast_once() {
    let t = utxo();
    let id = pass(&t.ledger, &utxo_proposal("Race", spend(10_000)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = t.manager.clone();
            tokio::spawn(async move { manager.execute(&executor(), &id).await })
        })
        .collect();
    let mut executed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => executed += 1,
            Err(e) => assert!(matches!(
                e.kind(),
                ErrorKind::ConcurrentExecution | ErrorKind::AlreadyExecuted
            )),
        }
    }
    assert_eq!(executed, 1);
    assert_eq!(t.chain.broadcasts().len(), 1);
}

#[tokio::test]
async fn insufficient_funds_fail_the_proposal() {
    let t = utxo();
    let id = pass(&t.ledger, &utxo_proposal("Too much", spend(1_000_000)));

    let err = t.manager.execute(&executor(), &id).await.unwrap_err();
    assert!(matches!(err, TreasuryError::ExecutionFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert!(t.chain.broadcasts().is_empty());

    let events = StatusBoard::new(t.ledger.clone()).history(&id).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.to, ProposalStatus::Failed);
    assert!(last.reason.as_deref().unwrap().contains("insufficient"));

    let retry = t.manager.execute(&executor(), &id).await.unwrap_err();
    assert_eq!(retry.kind(), ErrorKind::ConcurrentExecution);
}

#[tokio::test]
async fn rejected_broadcast_fails_the_proposal() {
    let t = utxo();
    let id = pass(&t.ledger, &utxo_proposal("Rejected", spend(10_000)));
    t.chain.fail_next_broadcast("min relay fee not met");

    let err = t.manager.execute(&executor(), &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Broadcast);
    assert!(err.is_retryable());
    assert_eq!(
        history(&t.ledger, &id).last(),
        Some(&ProposalStatus::Failed)
    );
}

#[tokio::test]
async fn only_passed_proposals_execute() {
    let t = utxo();
    let proposal = utxo_proposal("Still voting", spend(10_000));
    let ledger: Arc<dyn GovernanceLedger> = t.ledger.clone();
    let id = GovernanceStore::new(ledger.clone())
        .put_proposal(&proposal)
        .unwrap();
    StatusBoard::new(ledger).register(&id).unwrap();

    let err = t.manager.execute(&executor(), &id).await.unwrap_err();
    assert!(matches!(
        err,
        TreasuryError::NotPassed {
            found: ProposalStatus::Draft,
            ..
        }
    ));
    assert!(t.chain.broadcasts().is_empty());
}

#[tokio::test]
async fn signals_execute_without_a_transaction() {
    let t = utxo();
    let id = pass(&t.ledger, &utxo_proposal("Adopt the charter", UtxoAction::Signal));
    let result = t.manager.execute(&executor(), &id).await.unwrap();
    assert_eq!(result.status, ProposalStatus::Executed);
    assert_eq!(result.tx, None);
    assert!(t.chain.broadcasts().is_empty());
}

#[tokio::test]
async fn recipients_on_another_network_are_refused() {
    let t = utxo();
    let mainnet = recipient_key().p2wpkh_address(Network::Bitcoin);
    let action = UtxoAction::Spend {
        recipient: mainnet.to_string(),
        amount: Amount::new(10_000),
    };
    let id = pass(&t.ledger, &utxo_proposal("Wrong network", action));
    let err = t.manager.execute(&executor(), &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(t.chain.broadcasts().is_empty());
}

#[tokio::test]
async fn asset_transfer_keeps_the_remainder_visible() {
    let t = utxo();
    let asset_id = AssetId::new([0x42; 32]);
    let holding = AssetCodec
        .build_commitment(
            asset_id,
            Amount::new(1_000),
            b"",
            treasury_key().x_only_public_key(),
        )
        .unwrap();
    t.chain.fund(holding.script_pubkey(), 546);
    t.adapter
        .register_commitments(&[holding.leaf_script().to_owned()])
        .unwrap();

    let action = UtxoAction::AssetTransfer {
        recipient_key: recipient_key().x_only_public_key().serialize(),
        asset_id,
        amount: Amount::new(400),
    };
    let id = pass(&t.ledger, &utxo_proposal("Grant tokens", action));
    t.manager.execute(&executor(), &id).await.unwrap();

    let after = t.adapter.get_balance(&treasury().to_string()).await.unwrap();
    assert_eq!(after.asset(&asset_id), Amount::new(600));
}

#[tokio::test]
async fn utxo_spend_needs_a_treasury_signer() {
    let chain = Arc::new(NullUtxoChain::new().auto_mine());
    fund_executor(&chain);
    let config = UtxoChainConfig::new("http://127.0.0.1:18443", Network::Regtest, treasury().to_string());
    let ledger = Arc::new(NullLedger::new());
    let manager = TreasuryManager::new(
        ledger.clone(),
        TreasuryConfig::default(),
        Arc::new(NullClock::new(NOW)),
    )
    .unwrap()
    .with_adapter(Arc::new(UtxoChainAdapter::new(config, chain).unwrap()));
    let id = pass(&ledger, &utxo_proposal("No key", spend(10_000)));
    let err = manager.execute(&executor(), &id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

fn contract() -> (Arc<NullContractChain>, Arc<NullLedger>, TreasuryManager) {
    contract_on(NullContractChain::new(DAO))
}

fn contract_on(
    chain: NullContractChain,
) -> (Arc<NullContractChain>, Arc<NullLedger>, TreasuryManager) {
    let chain = Arc::new(chain);
    chain.set_balance(EvmAddress::new([0x7e; 20]), Amount::new(9_000));
    chain.set_balance(CONTRACT_EXECUTOR, Amount::new(1_000));
    let config = ContractChainConfig::new(
        "http://127.0.0.1:8545",
        DAO.to_string(),
        EvmAddress::new([0x5e; 20]).to_string(),
        EvmAddress::new([0x7e; 20]).to_string(),
    );
    let adapter = ContractChainAdapter::new(config, chain.clone()).unwrap();
    let ledger = Arc::new(NullLedger::new());
    let manager = TreasuryManager::new(
        ledger.clone(),
        TreasuryConfig::default(),
        Arc::new(NullClock::new(NOW)),
    )
    .unwrap()
    .with_adapter(Arc::new(adapter));
    (chain, ledger, manager)
}

fn contract_proposal(id: u64, action: ContractAction) -> Proposal {
    Proposal::Contract {
        id: Some(id),
        proposer: EvmAddress::new([0x01; 20]),
        body: body("Contract spend"),
        action,
    }
}

#[tokio::test]
async fn contract_spend_calls_execute() {
    let (chain, ledger, manager) = contract();
    let contract_id = chain.store_proposal(EvmAddress::new([0x01; 20]), vec![0x21]);
    let proposal = contract_proposal(
        contract_id,
        ContractAction::Spend {
            recipient: EvmAddress::new([0xaa; 20]),
            amount: Amount::new(1_000),
        },
    );
    let id = pass(&ledger, &proposal);

    let result = manager.execute(&CONTRACT_EXECUTOR.to_string(), &id).await.unwrap();
    assert_eq!(result.chain, Chain::Contract);
    assert!(result.tx.is_some());
    assert_eq!(result.fee, None);
    assert_eq!(chain.executed(), vec![contract_id]);

    let again = manager.execute(&CONTRACT_EXECUTOR.to_string(), &id).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::AlreadyExecuted);
    assert_eq!(chain.executed(), vec![contract_id]);
}

#[tokio::test]
async fn contract_signal_needs_no_call() {
    let (chain, ledger, manager) = contract();
    let id = pass(&ledger, &contract_proposal(7, ContractAction::Signal));
    manager.execute(&CONTRACT_EXECUTOR.to_string(), &id).await.unwrap();
    assert!(chain.executed().is_empty());
}

#[tokio::test]
async fn report_splits_each_native_balance() {
    let (_, _, manager) = contract();
    let report = manager.report().await.unwrap();
    assert_eq!(report.balances[&Chain::Contract].native, Amount::new(9_000));
    let split = &report.allocations[&Chain::Contract];
    assert_eq!(split.get("grants"), Amount::new(4_500));
    assert_eq!(split.get("operations"), Amount::new(2_700));
    assert_eq!(split.get("reserve"), Amount::new(1_800));
}

#[tokio::test]
async fn total_balance_spans_every_chain() {
    let t = utxo();
    let balances = t.manager.get_total_balance().await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[&Chain::Utxo].native, Amount::new(100_000));
}

#[test]
fn config_reads_from_toml() {
    let config: TreasuryConfig = toml::from_str(
        r#"
        fee_rate = 12

        [policy]
        residual = "reserve"
        primary = { name = "ubi", bps = 6000 }
        secondary = { name = "research", bps = 1500 }
        "#,
    )
    .unwrap();
    assert_eq!(config.fee_rate, 12);
    assert_eq!(config.execution_threshold, 100);
    assert_eq!(config.policy.primary.bps, 6_000);
    assert_eq!(TreasuryConfig::default().fee_rate, 5);
}

#[tokio::test]
async fn non_members_cannot_execute() {
    let t = utxo();
    let id = pass(&t.ledger, &utxo_proposal("Pay me", spend(10_000)));
    let stranger = recipient().to_string();

    let err = t.manager.execute(&stranger, &id).await.unwrap_err();
    assert!(matches!(err, TreasuryError::NotAuthorized { chain: Chain::Utxo, .. }));
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(t.chain.broadcasts().is_empty());
    assert_eq!(history(&t.ledger, &id).last(), Some(&ProposalStatus::Passed));

    t.manager.execute(&executor(), &id).await.unwrap();
}

#[tokio::test]
async fn utxo_statement_counts_the_spend_and_its_fee() {
    let t = utxo();
    let id = pass(&t.ledger, &utxo_proposal("Pay the auditors", spend(30_000)));
    let fee = t.manager.execute(&executor(), &id).await.unwrap().fee.unwrap();

    let statement = t
        .manager
        .income_and_expenses(Timestamp::new(0), Timestamp::new(NOW))
        .await
        .unwrap();
    let utxo = &statement.chains[&Chain::Utxo];
    assert_eq!(utxo.income, Amount::new(100_000));
    assert_eq!(utxo.expenses, Amount::new(30_000).saturating_add(fee));
    assert_eq!(utxo.net(), 70_000 - fee.raw() as i128);
    let directions: Vec<FlowDirection> = utxo.flows.iter().map(|f| f.direction).collect();
    assert_eq!(directions, vec![FlowDirection::Income, FlowDirection::Expense]);
}

#[tokio::test]
async fn contract_statement_reads_deposits_and_payouts() {
    let clock = Arc::new(NullClock::new(NOW - 3_000));
    let (chain, ledger, manager) =
        contract_on(NullContractChain::new(DAO).with_clock(clock.clone()));
    chain.deposit(EvmAddress::new([0xd0; 20]), Amount::new(5_000));

    let spend = Proposal::Contract {
        id: None,
        proposer: EvmAddress::new([0x01; 20]),
        body: body("Contract spend"),
        action: ContractAction::Spend {
            recipient: EvmAddress::new([0xaa; 20]),
            amount: Amount::new(1_200),
        },
    };
    let payload = ProposalCodec::default().encode(&spend).unwrap();
    clock.advance(1_000);
    let contract_id = chain.store_proposal(EvmAddress::new([0x01; 20]), payload);
    let id = pass(&ledger, &spend.with_contract_id(contract_id));
    manager
        .execute(&CONTRACT_EXECUTOR.to_string(), &id)
        .await
        .unwrap();
    clock.advance(1_000);
    chain.deposit(EvmAddress::new([0xd1; 20]), Amount::new(300));

    let statement = manager
        .income_and_expenses(Timestamp::new(NOW - 3_000), Timestamp::new(NOW))
        .await
        .unwrap();
    let contract = &statement.chains[&Chain::Contract];
    assert_eq!(contract.income, Amount::new(5_300));
    assert_eq!(contract.expenses, Amount::new(1_200));
    assert_eq!(contract.net(), 4_100);

    let incoming = manager
        .incoming_funds(Timestamp::new(NOW - 2_500), Timestamp::new(NOW))
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].amount, Amount::new(300));
    assert_eq!(incoming[0].time, Timestamp::new(NOW - 1_000));

    let empty = manager
        .income_and_expenses(Timestamp::new(NOW), Timestamp::new(NOW))
        .await
        .unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Validation);
}
