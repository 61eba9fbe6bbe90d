//! Transaction building for the UTXO chain.
//!
//! [`TransactionBuilder::build`] turns a candidate UTXO set and a list of
//! [`OutputSpec`] lines into an [`UnsignedTx`]: inputs are chosen greedily,
//! the fee comes from a fixed per-input/per-output byte model, and any
//! residual above dust returns as change. Asset outputs are delegated to
//! `tandem-assets`; this crate never lays out commitment scripts itself.

pub mod builder;
pub mod error;
pub mod fee;
pub mod validation;

pub use builder::{BuilderParams, OutputSpec, TransactionBuilder, UnsignedTx, DUST_THRESHOLD};
pub use error::BuildError;
pub use fee::FeeRate;
pub use validation::validate_unsigned;
