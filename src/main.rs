//! scriptscan - Bitcoin script and transaction classification explorer
//!
//! ## Usage
//!
//! ```bash
//! # Classify a transaction, fetching the outputs it spends
//! scriptscan tx 4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b --pretty
//!
//! # Spend and output type statistics for a block
//! scriptscan stats 840000 --resolve-inputs
//!
//! # Decode without a node
//! scriptscan script 76a91489abcdefabbaabbaabbaabbaabbaabbaabbaabba88ac
//! scriptscan witness <sig-hex> <pubkey-hex>
//! ```

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing::{debug, error};

use scriptscan::cache::CacheManager;
use scriptscan::config::{Settings, DEFAULT_CONFIG_FILE};
use scriptscan::explorer::{BlockKey, Explorer};
use scriptscan::metrics::{gather_metrics, init_metrics};
use scriptscan::node;
use scriptscan::render::{to_json, BlockStatsView, ScriptReport, TxView, WitnessReport};
use scriptscan::script::Script;
use scriptscan::segwit::Segwit;
use scriptscan::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[clap(name = "scriptscan")]
#[clap(about = "Classify Bitcoin scripts, inputs and outputs", long_about = None)]
struct Args {
    /// Settings file; missing is fine, defaults and SCRIPTSCAN__* variables apply
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Pretty-print JSON output
    #[clap(long, global = true)]
    pretty: bool,

    /// Print Prometheus metrics after the command
    #[clap(long, global = true)]
    metrics: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one transaction
    Tx {
        txid: String,
        /// Skip fetching spent outputs; spend types are then inferred
        #[clap(long)]
        no_prevouts: bool,
    },
    /// Show a block (tip when no key is given)
    Block {
        /// Block hash or height
        key: Option<String>,
    },
    /// Spend and output type statistics for a block
    Stats {
        /// Block hash or height
        key: Option<String>,
        /// Fetch every spent output for exact spend types
        #[clap(long)]
        resolve_inputs: bool,
    },
    /// Current block height
    Height,
    /// Decode and classify a script given as hex
    Script { hex: String },
    /// Decode a witness stack given as hex items
    Witness { items: Vec<String> },
}

fn block_key(key: Option<&str>) -> Result<BlockKey, Box<dyn Error>> {
    Ok(key.unwrap_or("").parse::<BlockKey>()?)
}

async fn run(args: &Args, settings: &Settings) -> Result<String, Box<dyn Error>> {
    // Offline commands need no node
    match &args.command {
        Command::Script { hex } => {
            let script = Script::from_hex(hex.trim())?;
            return Ok(to_json(&ScriptReport::from(&script), args.pretty)?);
        }
        Command::Witness { items } => {
            let segwit = Segwit::from_hex(items)?;
            return Ok(to_json(&WitnessReport::from(&segwit), args.pretty)?);
        }
        _ => {}
    }

    let node = node::connect(&settings.node).await?;
    let explorer = Explorer::new(node, CacheManager::new(&settings.cache), &settings.explorer);
    debug!(node = %explorer.node_version(), "Explorer ready");

    let json = match &args.command {
        Command::Tx { txid, no_prevouts } => {
            let tx = explorer.tx(txid, !no_prevouts).await?;
            to_json(&TxView::from(&tx), args.pretty)?
        }
        Command::Block { key } => {
            let block = explorer.block(&block_key(key.as_deref())?).await?;
            to_json(&block, args.pretty)?
        }
        Command::Stats { key, resolve_inputs } => {
            let (block, stats) = explorer
                .block_stats(&block_key(key.as_deref())?, *resolve_inputs)
                .await?;
            to_json(&BlockStatsView { block: &block, stats: &stats }, args.pretty)?
        }
        Command::Height => explorer.current_block_height().await?.to_string(),
        Command::Script { .. } | Command::Witness { .. } => unreachable!("handled above"),
    };
    Ok(json)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    let log_guard = init_tracing(&settings.logging.telemetry_config())?;
    init_metrics()?;

    let result = run(&args, &settings).await;
    if args.metrics {
        print!("{}", gather_metrics()?);
    }

    match result {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {}", e);
            drop(log_guard);
            std::process::exit(1);
        }
    }
}
