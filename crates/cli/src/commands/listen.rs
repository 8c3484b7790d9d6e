//! Run a node and print the bus traffic it sees.

use super::data::DataDir;
use super::record::parse_content;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use peerchain_core::Record;
use peerchain_node::{Envelope, InMemoryBus, NodeRuntime, Publisher, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

#[derive(Args)]
pub struct ListenArgs {
    /// Directory to store node data
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Records to submit once the node is up
    #[arg(short, long = "record")]
    records: Vec<String>,
}

pub fn run(args: ListenArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(listen(DataDir::new(args.data_dir), args.records))
}

fn print_event(envelope: &Envelope) {
    let mut payload = envelope.payload.to_string();
    if payload.len() > 120 {
        let cut = (0..=117).rev().find(|&i| payload.is_char_boundary(i)).unwrap_or(0);
        payload.truncate(cut);
        payload.push_str("...");
    }
    let sender = if envelope.sender.is_empty() {
        "client"
    } else {
        envelope.sender.get(..12).unwrap_or(&envelope.sender)
    };
    println!(
        "{} {} {}",
        envelope.topic.to_string().bright_cyan(),
        format!("[{}]", sender).bright_black(),
        payload
    );
}

async fn listen(data: DataDir, records: Vec<String>) -> Result<()> {
    let bus = Arc::new(InMemoryBus::default());
    let node = Arc::new(data.open_node(bus.clone())?);
    let mut events = bus.subscribe();
    let runtime = NodeRuntime::start(Arc::clone(&node), bus.as_ref())?;

    println!(
        "{} {}",
        "Listening as".bold().cyan(),
        node.node_id().bright_yellow()
    );
    println!("{}", "Press Ctrl-C to stop.".bright_black());
    println!();

    let client = Publisher::new(bus.clone(), "");
    for (index, content) in records.iter().enumerate() {
        client.notify_add_record(&Record::new(index as u64, parse_content(content)))?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(envelope) => print_event(&envelope),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    runtime.shutdown().await;
    data.save_node(&node)?;
    println!();
    println!(
        "{}  Saved chain ({} blocks)",
        "✓".green().bold(),
        node.repository().len()
    );
    Ok(())
}
