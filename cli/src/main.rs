//! tandem: read-only views over the DAO's chains, plus keystore creation.

use anyhow::{bail, Context};
use bitcoin::Network;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_node::{init_logging, NodeConfig, NodeError, TandemNode};
use tandem_store::MemoryLedger;
use tandem_treasury::allocate;
use tandem_types::{Amount, Chain, ProposalId, Timestamp};
use tandem_utils::{format_duration, retry, Backoff, SystemClock};
use tandem_wallet_core::{
    encrypt_keystore, generate_mnemonic, save_keystore, seed_from_mnemonic, KeyManager,
    SecretKind, DEFAULT_TREASURY_PATH,
};

#[derive(Parser)]
#[command(name = "tandem", about = "Two-chain DAO governance and treasury")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "TANDEM_CONFIG")]
    config: Option<PathBuf>,

    /// Log format: "human" or "json". Overrides the file.
    #[arg(long, env = "TANDEM_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level filter. Overrides the file.
    #[arg(long, env = "TANDEM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Per-request chain RPC timeout in seconds. Overrides the file.
    #[arg(long, env = "TANDEM_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Treasury balance on every configured chain, with its allocation.
    Balance,
    /// Treasury income and expenses between two unix times.
    Statement {
        /// Inclusive start, unix seconds.
        #[arg(long)]
        from: u64,
        /// Exclusive end, unix seconds.
        #[arg(long)]
        to: u64,
    },
    /// Inspect committed proposals.
    Proposals {
        #[command(subcommand)]
        action: ProposalsAction,
    },
    /// Split an amount under the configured allocation policy.
    Allocate {
        /// Total in minor units.
        #[arg(long)]
        total: u128,
    },
    /// Manage encrypted key files.
    Keystore {
        #[command(subcommand)]
        action: KeystoreAction,
    },
}

#[derive(clap::Subcommand)]
enum ProposalsAction {
    /// Every proposal committed on a chain.
    List {
        /// "utxo" or "contract".
        #[arg(long)]
        chain: Chain,
    },
    /// Current vote totals of one proposal.
    Tally {
        /// "utxo:<hex>" or "contract:<n>".
        id: ProposalId,
    },
}

#[derive(clap::Subcommand)]
enum KeystoreAction {
    /// Generate a mnemonic and write its seed, encrypted, to a new file.
    New {
        #[arg(long)]
        out: PathBuf,
        /// Network of the treasury address shown for the new key.
        #[arg(long, default_value = "bitcoin")]
        network: Network,
        #[arg(long, env = "TANDEM_KEYSTORE_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(timeout) = cli.request_timeout {
        config.request_timeout_secs = timeout;
    }
    Ok(config)
}

fn connect(config: NodeConfig) -> anyhow::Result<TandemNode> {
    TandemNode::connect(config).context("no usable chain configuration, pass --config")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    match config.log_format() {
        Ok(format) => init_logging(format, &config.log_level),
        Err(_) => tandem_utils::init_tracing(&config.log_level),
    }

    match cli.command {
        Command::Balance => {
            let node = connect(config)?;
            let treasury = node.treasury(
                Arc::new(MemoryLedger::new()),
                Arc::new(SystemClock),
                None,
            )?;
            let report = retry(Backoff::default(), NodeError::is_retryable, || async {
                Ok::<_, NodeError>(treasury.report().await?)
            })
            .await?;
            for (chain, snapshot) in &report.balances {
                let height = snapshot
                    .height
                    .map_or_else(|| "-".to_string(), |h| h.to_string());
                println!("{chain}  {}  native {}  height {height}", snapshot.address, snapshot.native);
                for (asset, amount) in &snapshot.assets {
                    println!("    asset {asset}  {amount}");
                }
                if let Some(split) = report.allocations.get(chain) {
                    for (category, amount) in split.iter() {
                        println!("    {category:<12} {amount}");
                    }
                }
            }
        }
        Command::Statement { from, to } => {
            let node = connect(config)?;
            let treasury = node.treasury(
                Arc::new(MemoryLedger::new()),
                Arc::new(SystemClock),
                None,
            )?;
            let (from, to) = (Timestamp::new(from), Timestamp::new(to));
            let statement = retry(Backoff::default(), NodeError::is_retryable, || async {
                Ok::<_, NodeError>(treasury.income_and_expenses(from, to).await?)
            })
            .await?;
            for (chain, s) in &statement.chains {
                println!(
                    "{chain}  income {}  expenses {}  net {}",
                    s.income,
                    s.expenses,
                    s.net()
                );
                for flow in &s.flows {
                    println!(
                        "    {}  {:<7} {}  {}",
                        flow.time, flow.direction, flow.amount, flow.tx
                    );
                }
            }
        }
        Command::Proposals {
            action: ProposalsAction::List { chain },
        } => {
            let node = connect(config)?;
            let proposals =
                retry(Backoff::default(), NodeError::is_retryable, || node.proposals(chain)).await?;
            for proposal in proposals {
                let body = proposal.body();
                let id = proposal
                    .id()
                    .map_or_else(|| "draft".to_string(), |id| id.to_string());
                let window = match body.end_time {
                    Some(end) => format_duration(body.start_time.secs_until(end)),
                    None => "open-ended".to_string(),
                };
                println!(
                    "{id}  {:?}  {}  from {} for {window}  by {}",
                    proposal.kind(),
                    body.title,
                    body.start_time,
                    proposal.proposer()
                );
            }
        }
        Command::Proposals {
            action: ProposalsAction::Tally { id },
        } => {
            let node = connect(config)?;
            let tally = retry(Backoff::default(), NodeError::is_retryable, || node.tally(&id)).await?;
            println!("{id}  {} voters  {} cast", tally.voters, tally.cast());
            for (option, weight) in &tally.totals {
                println!("    {option:<16} {weight}");
            }
        }
        Command::Allocate { total } => {
            let split = allocate(Amount::new(total), &config.treasury.policy)?;
            for (category, amount) in split.iter() {
                println!("{category:<12} {amount}");
            }
        }
        Command::Keystore {
            action:
                KeystoreAction::New {
                    out,
                    network,
                    password,
                },
        } => {
            if out.exists() {
                bail!("{} already exists", out.display());
            }
            if password.is_empty() {
                bail!("keystore password must not be empty");
            }
            let mnemonic = generate_mnemonic()?;
            let seed = seed_from_mnemonic(&mnemonic, "")?;
            let key = KeyManager::new(network).derive(&seed, DEFAULT_TREASURY_PATH)?;
            let address = key.p2wpkh_address(network);
            let mut keystore = encrypt_keystore(seed.as_bytes(), SecretKind::Seed, &password)?;
            keystore.label = Some(address.to_string());
            save_keystore(&keystore, &out)?;
            tracing::info!(path = %out.display(), "keystore written");
            println!("address   {address}");
            println!("mnemonic  {mnemonic}");
            println!("Write the mnemonic down; it is not stored in the clear anywhere.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tally_takes_a_typed_id() {
        let cli = Cli::try_parse_from(["tandem", "proposals", "tally", "contract:7"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Proposals {
                action: ProposalsAction::Tally {
                    id: ProposalId::Contract(7)
                }
            }
        ));
        assert!(Cli::try_parse_from(["tandem", "proposals", "tally", "7"]).is_err());
    }

    #[test]
    fn statement_takes_a_period() {
        let cli =
            Cli::try_parse_from(["tandem", "statement", "--from", "100", "--to", "200"]).unwrap();
        assert!(matches!(cli.command, Command::Statement { from: 100, to: 200 }));
        assert!(Cli::try_parse_from(["tandem", "statement", "--from", "100"]).is_err());
    }

    #[test]
    fn flags_override_the_file() {
        let cli = Cli::try_parse_from([
            "tandem",
            "--log-level",
            "debug",
            "--request-timeout",
            "3",
            "allocate",
            "--total",
            "100",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.request_timeout_secs, 3);
    }
}
