//! Nullable governance ledger: the in-memory ledger plus write failures on demand.

use std::sync::atomic::{AtomicBool, Ordering};
use tandem_store::{GovernanceLedger, MemoryLedger, StoreError};

#[derive(Debug, Default)]
pub struct NullLedger {
    inner: MemoryLedger,
    fail_writes: AtomicBool,
}

impl NullLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".into()));
        }
        Ok(())
    }
}

impl GovernanceLedger for NullLedger {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        self.inner.compare_and_swap(key, expected, new)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.inner.scan_prefix(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tandem_store::GovernanceStore;
    use tandem_types::{
        Chain, ChainPosition, Proposal, ProposalBody, ProposalId, Timestamp, TxHash, UtxoAction,
        Vote, VoteWitness,
    };

    fn proposal(seed: u8) -> Proposal {
        Proposal::Utxo {
            id: [seed; 32],
            proposer: "bcrt1qproposer".into(),
            body: ProposalBody {
                title: format!("proposal {seed}"),
                description: String::new(),
                options: vec!["Yes".into(), "No".into()],
                start_time: Timestamp::new(1),
                end_time: None,
            },
            action: UtxoAction::Signal,
        }
    }

    #[test]
    fn failing_writes_surface_as_backend_errors() {
        let ledger = NullLedger::new();
        ledger.fail_writes(true);
        assert!(matches!(
            ledger.put("k", b"v"),
            Err(StoreError::Backend(_))
        ));
        assert!(ledger.is_empty());
        ledger.fail_writes(false);
        assert!(ledger.compare_and_swap("k", None, b"v").unwrap());
    }

    #[test]
    fn governance_store_round_trips_proposals_and_votes() {
        let store = GovernanceStore::new(Arc::new(NullLedger::new()));
        let id = store.put_proposal(&proposal(1)).unwrap();
        store.put_proposal(&proposal(2)).unwrap();
        assert_eq!(store.proposal(&id).unwrap(), proposal(1));
        assert_eq!(store.list_proposals(Some(Chain::Utxo)).unwrap().len(), 2);
        assert!(store.list_proposals(Some(Chain::Contract)).unwrap().is_empty());

        let vote = Vote {
            proposal_id: id,
            voter: "bcrt1qvoter".into(),
            option: "Yes".into(),
            weight: 1u64.into(),
            witness: VoteWitness {
                tx: TxHash::new([3; 32]),
                position: ChainPosition::new(5, 1),
            },
        };
        store.put_votes(&id, &[vote.clone()]).unwrap();
        assert_eq!(store.get_votes(&id).unwrap(), vec![vote]);
        assert!(store
            .get_votes(&ProposalId::Contract(9))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn drafts_have_no_ledger_key() {
        let store = GovernanceStore::new(Arc::new(NullLedger::new()));
        let draft = match proposal(1) {
            Proposal::Utxo { body, .. } => Proposal::Contract {
                id: None,
                proposer: tandem_types::EvmAddress::ZERO,
                body,
                action: tandem_types::ContractAction::Signal,
            },
            other => other,
        };
        assert!(store.put_proposal(&draft).is_err());
    }
}
