//! Chain inspection commands.

use super::data::DataDir;
use anyhow::{bail, Result};
use chrono::DateTime;
use clap::{Args, Subcommand};
use colored::Colorize;
use peerchain_core::Block;
use std::path::PathBuf;

#[derive(Args)]
pub struct ChainArgs {
    #[command(subcommand)]
    command: ChainCommand,
}

#[derive(Subcommand)]
enum ChainCommand {
    /// Print the chain
    Show {
        /// Directory to store node data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Print raw JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Verify proofs and links of the stored chain
    Check {
        /// Directory to store node data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

pub fn run(args: ChainArgs) -> Result<()> {
    match args.command {
        ChainCommand::Show { data_dir, json } => show(&DataDir::new(data_dir), json),
        ChainCommand::Check { data_dir } => {
            if !check(&DataDir::new(data_dir))? {
                bail!("Chain is invalid");
            }
            Ok(())
        }
    }
}

fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn short(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}

fn print_block(block: &Block) {
    println!(
        "  {} {} {}",
        format!("#{}", block.index).bright_black(),
        short(block.hash_str()).bright_yellow(),
        format!("({} records)", block.record_count()).bright_black()
    );
    println!("      Previous:   {}", short(&block.previous_hash).bright_black());
    println!("      Timestamp:  {}", format_timestamp(block.timestamp).bright_black());
    if !block.side_links.is_empty() {
        let links: Vec<&str> = block.side_links.iter().map(|l| short(l)).collect();
        println!("      Side links: {}", links.join(", ").bright_black());
    }
    if block.signature.is_some() {
        println!("      Sealed:     {}", "yes".green());
    }
    for record in &block.records {
        println!("      - {}", record.content.to_string().bright_cyan());
    }
}

fn show(data: &DataDir, json: bool) -> Result<()> {
    let chain = data.load_chain()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
        return Ok(());
    }

    println!();
    println!(
        "{} {}",
        "Chain:".bold().cyan(),
        format!("{} blocks", chain.length()).bright_black()
    );
    println!();
    for block in chain.chain.iter().rev() {
        print_block(block);
    }
    println!();
    Ok(())
}

/// Validate the stored chain under the node's strategy.
pub fn check(data: &DataDir) -> Result<bool> {
    let chain = data.load_chain()?;
    let node = data.open_offline_node();
    // A chain that fails validation cannot be restored into a node
    let node = match node {
        Ok(node) => node,
        Err(e) => {
            println!("{}  {:#}", "✗".red().bold(), e);
            return Ok(false);
        }
    };

    let pow = node.strategy().proof_of_work();
    if let Err(e) = node.strategy().check_chain(&chain) {
        println!("{}  {}", "✗".red().bold(), e);
        return Ok(false);
    }

    println!(
        "{}  Chain is valid ({} blocks, difficulty {})",
        "✓".green().bold(),
        chain.length(),
        pow.difficulty()
    );
    Ok(true)
}
