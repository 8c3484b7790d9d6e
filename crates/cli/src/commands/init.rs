//! Initialize a node data directory.

use super::data::DataDir;
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use peerchain_chain::{NodeConfig, StrategyKind};
use peerchain_core::{Keypair, SigningAuthority};
use peerchain_node::{InMemoryBus, Node};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct InitArgs {
    /// Directory to store node data
    #[arg(short, long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Consensus strategy
    #[arg(short, long, value_parser = parse_strategy, default_value = "proof_of_work")]
    pub strategy: StrategyKind,

    /// Leading zero bits required by proof-of-work
    #[arg(long, default_value = "16")]
    pub difficulty: u32,

    /// Start as a trusted authority node
    #[arg(long)]
    pub trusted: bool,

    /// Addresses of authority nodes known at start
    #[arg(long = "known-miner")]
    pub known_miners: Vec<String>,

    /// Overwrite an existing data directory
    #[arg(long)]
    pub force: bool,
}

fn parse_strategy(s: &str) -> Result<StrategyKind, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown strategy '{s}' (proof_of_work, authority, proof_of_stake)"))
}

pub fn run(args: InitArgs) -> Result<()> {
    println!("{}", "Initializing peerchain node...".bold().cyan());
    println!();

    let data = DataDir::new(&args.data_dir);
    if data.config_path().exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            data.config_path().display()
        );
    }
    fs::create_dir_all(data.root())
        .with_context(|| format!("Failed to create data directory: {:?}", args.data_dir))?;
    println!("{}  Created data directory", "✓".green().bold());

    let keypair = Keypair::generate();
    data.save_keypair(&keypair)?;
    println!(
        "{}  Generated node key: {}",
        "✓".green().bold(),
        keypair.address().bright_yellow()
    );

    let config = NodeConfig {
        node_id: keypair.address(),
        trusted: args.trusted,
        strategy: args.strategy,
        difficulty: args.difficulty,
        known_miners: args.known_miners,
        ..Default::default()
    };
    config
        .save(data.config_path())
        .context("Failed to write config.json")?;
    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        data.config_path().display().to_string().bright_black()
    );

    let node = Node::new(
        config,
        Some(SigningAuthority::new(keypair)),
        Arc::new(InMemoryBus::default()),
    );
    data.save_node(&node)?;
    let genesis = node
        .repository()
        .get_last_block()
        .context("Chain has no genesis")?;
    println!("{}  Created genesis block", "✓".green().bold());
    println!("    Hash:     {}", genesis.hash_str().bright_yellow());
    println!("    Strategy: {}", args.strategy.to_string().bright_cyan());

    println!();
    println!("{}", "Node initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  • Use {} to submit a record",
        "peerchain record add <content>".bright_cyan()
    );
    println!("  • Use {} to mine it", "peerchain block mine".bright_cyan());
    println!("  • Use {} to inspect the chain", "peerchain chain show".bright_cyan());

    Ok(())
}
