//! Vote tally.
//!
//! Each voter counts once, with the weight and option of their last vote in
//! canonical chain order (block height, then transaction index). Earlier
//! votes are superseded, never summed.

use std::collections::BTreeMap;
use tandem_types::{Amount, ProposalId, Vote};

/// Total weight per option for one proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tally {
    pub proposal_id: ProposalId,
    /// Every option of the proposal, zero when nobody chose it.
    pub totals: BTreeMap<String, Amount>,
    /// Distinct voters counted.
    pub voters: usize,
}

impl Tally {
    pub fn weight(&self, option: &str) -> Amount {
        self.totals.get(option).copied().unwrap_or(Amount::ZERO)
    }

    /// Sum of all counted weight.
    pub fn cast(&self) -> Amount {
        self.totals.values().copied().sum()
    }
}

/// Stateless; every call is a pure function of its inputs.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoteTally;

impl VoteTally {
    /// The surviving vote of every voter on `proposal_id`, ordered by voter.
    ///
    /// Two votes at the same chain position (one transaction carrying both)
    /// are ordered by option then weight so the choice never depends on
    /// input order.
    pub fn latest_per_voter(&self, proposal_id: &ProposalId, votes: &[Vote]) -> Vec<Vote> {
        let mut latest: BTreeMap<&str, &Vote> = BTreeMap::new();
        for vote in votes.iter().filter(|v| v.proposal_id == *proposal_id) {
            match latest.get(vote.voter.as_str()) {
                Some(current) if order_key(current) >= order_key(vote) => {}
                _ => {
                    latest.insert(vote.voter.as_str(), vote);
                }
            }
        }
        latest.into_values().cloned().collect()
    }

    /// Fold `votes` into per-option totals.
    ///
    /// Votes naming another proposal or an option outside `options` are
    /// ignored.
    pub fn tally(&self, proposal_id: &ProposalId, options: &[String], votes: &[Vote]) -> Tally {
        let mut totals: BTreeMap<String, Amount> =
            options.iter().map(|o| (o.clone(), Amount::ZERO)).collect();
        let mut voters = 0;
        for vote in self.latest_per_voter(proposal_id, votes) {
            if let Some(total) = totals.get_mut(&vote.option) {
                *total = total.saturating_add(vote.weight);
                voters += 1;
            }
        }
        Tally {
            proposal_id: *proposal_id,
            totals,
            voters,
        }
    }
}

fn order_key(vote: &Vote) -> (tandem_types::ChainPosition, &str, Amount) {
    (vote.witness.position, vote.option.as_str(), vote.weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_types::{ChainPosition, TxHash, VoteWitness};

    const ID: ProposalId = ProposalId::Contract(1);

    fn options() -> Vec<String> {
        vec!["Yes".into(), "No".into()]
    }

    fn vote(voter: &str, option: &str, weight: u128, height: u64, index: u32) -> Vote {
        Vote {
            proposal_id: ID,
            voter: voter.into(),
            option: option.into(),
            weight: Amount::new(weight),
            witness: VoteWitness {
                tx: TxHash::new([height as u8; 32]),
                position: ChainPosition::new(height, index),
            },
        }
    }

    #[test]
    fn two_voters_two_options() {
        let votes = [vote("A", "Yes", 10, 1, 0), vote("B", "No", 5, 1, 1)];
        let tally = VoteTally.tally(&ID, &options(), &votes);
        assert_eq!(tally.weight("Yes"), Amount::new(10));
        assert_eq!(tally.weight("No"), Amount::new(5));
        assert_eq!(tally.cast(), Amount::new(15));
        assert_eq!(tally.voters, 2);
    }

    #[test]
    fn later_vote_supersedes_regardless_of_input_order() {
        let votes = [vote("A", "No", 3, 9, 0), vote("A", "Yes", 10, 2, 4)];
        let tally = VoteTally.tally(&ID, &options(), &votes);
        assert_eq!(tally.weight("Yes"), Amount::ZERO);
        assert_eq!(tally.weight("No"), Amount::new(3));
        assert_eq!(tally.voters, 1);
    }

    #[test]
    fn transaction_index_breaks_same_block_ties() {
        let votes = [vote("A", "No", 3, 5, 7), vote("A", "Yes", 3, 5, 2)];
        let tally = VoteTally.tally(&ID, &options(), &votes);
        assert_eq!(tally.weight("No"), Amount::new(3));
    }

    #[test]
    fn unknown_options_and_other_proposals_are_ignored() {
        let mut other = vote("B", "Yes", 8, 1, 0);
        other.proposal_id = ProposalId::Contract(2);
        let votes = [vote("A", "Maybe", 4, 1, 1), other];
        let tally = VoteTally.tally(&ID, &options(), &votes);
        assert_eq!(tally.cast(), Amount::ZERO);
        assert_eq!(tally.totals.len(), 2);
        assert_eq!(tally.voters, 0);
    }

    #[test]
    fn no_votes_yields_zeroes_for_every_option() {
        let tally = VoteTally.tally(&ID, &options(), &[]);
        assert!(tally.totals.values().all(|w| w.is_zero()));
        assert_eq!(tally.totals.keys().count(), 2);
    }
}
