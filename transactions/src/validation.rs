//! Structural checks on an [`UnsignedTx`] before it is signed.

use crate::builder::UnsignedTx;
use crate::error::BuildError;

/// Check that the input list lines up with the transaction and that value is
/// conserved (`inputs == outputs + fee`).
pub fn validate_unsigned(unsigned: &UnsignedTx) -> Result<(), BuildError> {
    if unsigned.tx.output.is_empty() {
        return Err(BuildError::NoOutputs);
    }
    let aligned = unsigned.tx.input.len() == unsigned.inputs.len()
        && unsigned
            .tx
            .input
            .iter()
            .zip(&unsigned.inputs)
            .all(|(txin, utxo)| txin.previous_output == utxo.outpoint);
    if !aligned {
        return Err(BuildError::InputMismatch);
    }
    let total_in = unsigned.total_in();
    let spent = unsigned
        .total_out()
        .checked_add(unsigned.fee)
        .ok_or(BuildError::Overflow)?;
    if total_in != spent {
        return Err(BuildError::InsufficientFunds {
            needed: spent,
            available: total_in,
        });
    }
    Ok(())
}
