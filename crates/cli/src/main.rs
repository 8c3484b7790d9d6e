//! peerchain CLI entry point.

use clap::Parser;
use tracing::Level;

mod commands;

#[derive(Parser)]
#[command(name = "peerchain")]
#[command(about = "A peer-node ledger with selectable consensus", long_about = None)]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("peerchain - A peer-node ledger with selectable consensus");
            println!("Run 'peerchain --help' for usage information.");
        }
    }
}
