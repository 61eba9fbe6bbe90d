//! Tandem node: configuration, logging and the wiring between them.
//!
//! [`NodeConfig`] is read from TOML; [`TandemNode`] turns its chain
//! sections into adapters and hands them to the governance engine and the
//! treasury. Binaries install logging through [`init_logging`].

pub mod config;
pub mod error;
pub mod logging;
pub mod node;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use node::TandemNode;
