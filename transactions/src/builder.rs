use crate::error::BuildError;
use crate::fee::{input_vbytes, output_vbytes, FeeRate, TX_OVERHEAD_VBYTES};
use bitcoin::absolute::LockTime;
use bitcoin::key::XOnlyPublicKey;
use bitcoin::script::PushBytes;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount as Sats, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use std::collections::BTreeMap;
use tandem_assets::AssetCodec;
use tandem_types::{Amount, AssetId, Utxo};
use tracing::debug;

/// Default minimum value of a spendable output.
pub const DUST_THRESHOLD: u64 = 546;

/// One requested output line.
#[derive(Clone, Debug)]
pub enum OutputSpec {
    /// Native value paid to an address.
    Native { address: Address, amount: u64 },
    /// Asset units committed to an owner key through [`AssetCodec`].
    Asset {
        asset_id: AssetId,
        amount: Amount,
        metadata: Vec<u8>,
        owner: XOnlyPublicKey,
    },
    /// Zero-value embeddable-data output.
    Data(Vec<u8>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderParams {
    pub dust_threshold: u64,
    /// Native value carried by every asset-commitment output.
    pub asset_carrier_value: u64,
}

impl Default for BuilderParams {
    fn default() -> Self {
        Self {
            dust_threshold: DUST_THRESHOLD,
            asset_carrier_value: DUST_THRESHOLD,
        }
    }
}

/// A fully-formed transaction awaiting signatures.
///
/// `inputs` holds the spent UTXOs in input order, which signing needs for
/// sighash computation. `total_in == total_out + fee` always holds.
#[derive(Clone, Debug)]
pub struct UnsignedTx {
    pub tx: Transaction,
    pub inputs: Vec<Utxo>,
    pub fee: u64,
    pub change_index: Option<usize>,
    /// Leaf script of every asset-commitment output, by output index. The
    /// leaf is not recoverable from the output itself.
    pub commitment_leaves: Vec<(usize, ScriptBuf)>,
}

impl UnsignedTx {
    pub fn total_in(&self) -> u64 {
        self.inputs.iter().map(|u| u.value).sum()
    }

    pub fn total_out(&self) -> u64 {
        self.tx.output.iter().map(|o| o.value.to_sat()).sum()
    }

    /// Previous outputs in input order.
    pub fn prevouts(&self) -> Vec<TxOut> {
        self.inputs
            .iter()
            .map(|u| TxOut {
                value: Sats::from_sat(u.value),
                script_pubkey: u.script_pubkey.clone(),
            })
            .collect()
    }

    pub fn change_value(&self) -> Option<u64> {
        self.change_index
            .and_then(|i| self.tx.output.get(i))
            .map(|o| o.value.to_sat())
    }
}

/// Selects inputs, prices the transaction and lays out its outputs.
#[derive(Clone, Debug, Default)]
pub struct TransactionBuilder {
    params: BuilderParams,
    assets: AssetCodec,
}

impl TransactionBuilder {
    pub fn new(params: BuilderParams) -> Self {
        Self {
            params,
            assets: AssetCodec,
        }
    }

    pub fn params(&self) -> BuilderParams {
        self.params
    }

    /// Build an unsigned transaction paying `outputs` from `candidates`.
    ///
    /// Native inputs are chosen greedily by descending value (ties broken by
    /// outpoint) until they cover the outputs plus the fee. Asset-bearing
    /// candidates are only spent to fund asset outputs; any asset remainder
    /// goes back to the owner of the first spent commitment. Fails without
    /// partial results when funds run out.
    pub fn build(
        &self,
        candidates: &[Utxo],
        outputs: &[OutputSpec],
        fee_rate: FeeRate,
        change_address: &Address,
    ) -> Result<UnsignedTx, BuildError> {
        if outputs.is_empty() {
            return Err(BuildError::NoOutputs);
        }

        let mut tx_outputs = Vec::with_capacity(outputs.len() + 1);
        let mut commitment_leaves = Vec::new();
        for spec in outputs {
            let (txout, leaf) = self.output(spec)?;
            if let Some(leaf) = leaf {
                commitment_leaves.push((tx_outputs.len(), leaf));
            }
            tx_outputs.push(txout);
        }

        let (mut selected, asset_change) = self.select_assets(candidates, outputs)?;
        for (txout, leaf) in asset_change {
            commitment_leaves.push((tx_outputs.len(), leaf));
            tx_outputs.push(txout);
        }

        let outputs_total = tx_outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value.to_sat()))
            .ok_or(BuildError::Overflow)?;

        let mut natives: Vec<&Utxo> = candidates.iter().filter(|u| !u.is_asset()).collect();
        natives.sort_by(|a, b| b.value.cmp(&a.value).then(a.outpoint.cmp(&b.outpoint)));
        let mut natives = natives.into_iter();

        let outputs_vbytes: u64 = tx_outputs.iter().map(|o| output_vbytes(&o.script_pubkey)).sum();
        let (inputs_total, fee) = loop {
            let inputs_total: u64 = selected.iter().map(|u| u.value).sum();
            let vbytes = TX_OVERHEAD_VBYTES
                + selected.iter().map(input_vbytes).sum::<u64>()
                + outputs_vbytes;
            let fee = fee_rate.fee_for(vbytes);
            let needed = outputs_total.checked_add(fee).ok_or(BuildError::Overflow)?;
            if inputs_total >= needed && !selected.is_empty() {
                break (inputs_total, fee);
            }
            match natives.next() {
                Some(utxo) => selected.push(utxo.clone()),
                None => {
                    let available = candidates
                        .iter()
                        .filter(|u| !u.is_asset())
                        .map(|u| u.value)
                        .chain(selected.iter().filter(|u| u.is_asset()).map(|u| u.value))
                        .sum();
                    return Err(BuildError::InsufficientFunds { needed, available });
                }
            }
        };

        let residual = inputs_total - outputs_total - fee;
        let change_script = change_address.script_pubkey();
        let change_cost = fee_rate.fee_for(output_vbytes(&change_script));
        let mut fee = fee;
        let mut change_index = None;
        match residual.checked_sub(change_cost) {
            Some(change) if change > 0 && change >= self.params.dust_threshold => {
                fee += change_cost;
                change_index = Some(tx_outputs.len());
                tx_outputs.push(TxOut {
                    value: Sats::from_sat(change),
                    script_pubkey: change_script,
                });
            }
            _ => fee += residual,
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: selected
                .iter()
                .map(|u| TxIn {
                    previous_output: u.outpoint,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                    witness: Witness::new(),
                })
                .collect(),
            output: tx_outputs,
        };
        debug!(
            inputs = selected.len(),
            outputs = tx.output.len(),
            fee,
            fee_rate = fee_rate.sat_per_vb(),
            "built unsigned transaction"
        );
        Ok(UnsignedTx {
            tx,
            inputs: selected,
            fee,
            change_index,
            commitment_leaves,
        })
    }

    fn output(&self, spec: &OutputSpec) -> Result<(TxOut, Option<ScriptBuf>), BuildError> {
        match spec {
            OutputSpec::Native { address, amount } => {
                if *amount == 0 {
                    return Err(BuildError::ZeroAmount);
                }
                if *amount < self.params.dust_threshold {
                    return Err(BuildError::BelowDust {
                        amount: *amount,
                        threshold: self.params.dust_threshold,
                    });
                }
                let txout = TxOut {
                    value: Sats::from_sat(*amount),
                    script_pubkey: address.script_pubkey(),
                };
                Ok((txout, None))
            }
            OutputSpec::Asset {
                asset_id,
                amount,
                metadata,
                owner,
            } => {
                let (txout, leaf) = self.asset_output(*asset_id, *amount, metadata, *owner)?;
                Ok((txout, Some(leaf)))
            }
            OutputSpec::Data(payload) => {
                let push = <&PushBytes>::try_from(payload.as_slice())
                    .map_err(|_| BuildError::DataTooLarge(payload.len()))?;
                let txout = TxOut {
                    value: Sats::ZERO,
                    script_pubkey: ScriptBuf::new_op_return(push),
                };
                Ok((txout, None))
            }
        }
    }

    fn asset_output(
        &self,
        asset_id: AssetId,
        amount: Amount,
        metadata: &[u8],
        owner: XOnlyPublicKey,
    ) -> Result<(TxOut, ScriptBuf), BuildError> {
        let commitment = self
            .assets
            .build_commitment(asset_id, amount, metadata, owner)?;
        let txout = TxOut {
            value: Sats::from_sat(self.params.asset_carrier_value),
            script_pubkey: commitment.script_pubkey(),
        };
        Ok((txout, commitment.leaf_script().to_owned()))
    }

    /// Pick asset inputs for every asset output and produce the asset change.
    fn select_assets(
        &self,
        candidates: &[Utxo],
        outputs: &[OutputSpec],
    ) -> Result<(Vec<Utxo>, Vec<(TxOut, ScriptBuf)>), BuildError> {
        let mut wanted: BTreeMap<AssetId, Amount> = BTreeMap::new();
        for spec in outputs {
            if let OutputSpec::Asset {
                asset_id, amount, ..
            } = spec
            {
                let entry = wanted.entry(*asset_id).or_insert(Amount::ZERO);
                *entry = entry.checked_add(*amount).ok_or(BuildError::Overflow)?;
            }
        }

        let mut selected = Vec::new();
        let mut change = Vec::new();
        for (asset_id, needed) in wanted {
            let mut holders: Vec<&Utxo> = candidates
                .iter()
                .filter(|u| u.asset.as_ref().is_some_and(|a| a.asset_id == asset_id))
                .collect();
            holders.sort_by(|a, b| {
                let (x, y) = (asset_amount(a), asset_amount(b));
                y.cmp(&x).then(a.outpoint.cmp(&b.outpoint))
            });

            let mut covered = Amount::ZERO;
            let mut first_owner = None;
            for holder in holders.iter().copied() {
                if covered >= needed {
                    break;
                }
                if first_owner.is_none() {
                    if let Some(asset) = &holder.asset {
                        first_owner = Some(self.assets.parse_commitment(&asset.leaf_script)?.owner);
                    }
                }
                covered = covered.saturating_add(asset_amount(holder));
                selected.push(holder.clone());
            }
            if covered < needed {
                return Err(BuildError::InsufficientAssets {
                    asset_id,
                    needed,
                    available: covered,
                });
            }
            let rest = covered.saturating_sub(needed);
            if let (false, Some(owner)) = (rest.is_zero(), first_owner) {
                change.push(self.asset_output(asset_id, rest, &[], owner)?);
            }
        }
        Ok((selected, change))
    }
}

fn asset_amount(utxo: &Utxo) -> Amount {
    utxo.asset.as_ref().map_or(Amount::ZERO, |a| a.amount)
}
