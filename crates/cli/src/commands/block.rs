//! Block operations command.

use super::data::DataDir;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use peerchain_chain::StrategyKind;
use peerchain_core::Block;
use peerchain_node::{process_pending, MiningOutcome};
use std::path::PathBuf;

#[derive(Args)]
pub struct BlockArgs {
    #[command(subcommand)]
    command: BlockCommand,
}

#[derive(Subcommand)]
enum BlockCommand {
    /// Mine (or mint) pending blocks into the chain
    Mine {
        /// Directory to store node data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Drain the whole pending queue instead of one block
        #[arg(short, long)]
        all: bool,
    },
}

pub fn run(args: BlockArgs) -> Result<()> {
    match args.command {
        BlockCommand::Mine { data_dir, all } => mine(&DataDir::new(data_dir), all).map(|_| ()),
    }
}

/// Mine pending blocks and return the ones added to the chain.
pub fn mine(data: &DataDir, all: bool) -> Result<Vec<Block>> {
    let node = data.open_offline_node()?;
    if node.strategy().kind() == StrategyKind::Authority && !node.is_trusted() {
        bail!("Only trusted authority nodes can mine under the authority strategy");
    }

    println!("{}", "Mining pending blocks...".bold().cyan());
    println!();

    let mut mined = Vec::new();
    while let Some(pending) = node.queue().pop() {
        match process_pending(&node, pending) {
            MiningOutcome::Mined(block) => {
                println!("{}  Block mined", "✓".green().bold());
                println!("    Index:   {}", block.index.to_string().bright_cyan());
                println!("    Hash:    {}", block.hash_str().bright_yellow());
                println!("    Nonce:   {}", block.nonce.to_string().bright_black());
                println!("    Records: {}", block.record_count().to_string().bright_cyan());
                mined.push(block);
            }
            outcome => {
                data.save_node(&node)?;
                bail!("Block was not added: {:?}", outcome);
            }
        }
        if !all {
            break;
        }
    }

    if mined.is_empty() {
        println!("{}", "No pending blocks to mine.".yellow());
    }
    data.save_node(&node)?;
    println!();
    Ok(mined)
}
