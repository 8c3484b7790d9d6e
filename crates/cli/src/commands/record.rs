//! Record submission command.

use super::data::DataDir;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use peerchain_core::Record;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Args)]
pub struct RecordArgs {
    #[command(subcommand)]
    command: RecordCommand,
}

#[derive(Subcommand)]
enum RecordCommand {
    /// Queue a record for the next block
    Add {
        /// Directory to store node data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Client-side index of the record
        #[arg(short, long, default_value = "0")]
        index: u64,

        /// Record content; parsed as JSON when possible
        content: String,
    },
}

pub fn run(args: RecordArgs) -> Result<()> {
    match args.command {
        RecordCommand::Add {
            data_dir,
            index,
            content,
        } => add_record(&DataDir::new(data_dir), index, &content).map(|_| ()),
    }
}

/// Parse `content` as JSON, falling back to a plain string.
pub fn parse_content(content: &str) -> Value {
    serde_json::from_str(content).unwrap_or_else(|_| Value::String(content.to_string()))
}

/// Queue a record and return the index of its pending block.
pub fn add_record(data: &DataDir, index: u64, content: &str) -> Result<u64> {
    let node = data.open_offline_node()?;
    let pending_index = node.add_record(Record::new(index, parse_content(content)));
    data.save_node(&node)?;

    println!(
        "{}  Queued record as pending block {}",
        "✓".green().bold(),
        format!("#{}", pending_index).bright_cyan()
    );
    println!(
        "    Pending: {}",
        node.queue().pending_blocks_count().to_string().bright_black()
    );
    Ok(pending_index)
}
