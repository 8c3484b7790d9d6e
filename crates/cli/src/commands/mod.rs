//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod block;
mod chain;
mod data;
mod init;
mod listen;
mod record;

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a node data directory
    Init(init::InitArgs),
    /// Record submission
    Record(record::RecordArgs),
    /// Block operations
    Block(block::BlockArgs),
    /// Chain inspection
    Chain(chain::ChainArgs),
    /// Run the node and print bus events
    Listen(listen::ListenArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init(args) => init::run(args),
        Commands::Record(args) => record::run(args),
        Commands::Block(args) => block::run(args),
        Commands::Chain(args) => chain::run(args),
        Commands::Listen(args) => listen::run(args),
    }
}

#[cfg(test)]
mod tests {
    use super::data::DataDir;
    use super::*;
    use peerchain_chain::StrategyKind;
    use std::fs;
    use tempfile::tempdir;

    fn init_args(dir: &std::path::Path, strategy: StrategyKind) -> init::InitArgs {
        init::InitArgs {
            data_dir: dir.to_path_buf(),
            strategy,
            difficulty: 8,
            trusted: false,
            known_miners: Vec::new(),
            force: false,
        }
    }

    #[test]
    fn test_init_record_mine_check() {
        let dir = tempdir().unwrap();
        init::run(init_args(dir.path(), StrategyKind::ProofOfWork)).unwrap();
        let data = DataDir::new(dir.path());
        assert_eq!(data.load_chain().unwrap().length(), 1);

        assert_eq!(record::add_record(&data, 0, "first").unwrap(), 1);
        assert_eq!(record::add_record(&data, 1, r#"{"amount": 3}"#).unwrap(), 2);
        assert_eq!(data.load_pending().unwrap().len(), 2);

        let mined = block::mine(&data, false).unwrap();
        assert_eq!(mined.len(), 1);
        assert_eq!(data.load_pending().unwrap().len(), 1);

        let mined = block::mine(&data, true).unwrap();
        assert_eq!(mined.len(), 1);
        assert_eq!(mined[0].records[0].content["amount"], 3);
        assert!(data.load_pending().unwrap().is_empty());

        assert_eq!(data.load_chain().unwrap().length(), 3);
        assert!(chain::check(&data).unwrap());
    }

    #[test]
    fn test_check_detects_tampering() {
        let dir = tempdir().unwrap();
        init::run(init_args(dir.path(), StrategyKind::ProofOfWork)).unwrap();
        let data = DataDir::new(dir.path());
        record::add_record(&data, 0, "honest").unwrap();
        block::mine(&data, false).unwrap();

        let mut chain = data.load_chain().unwrap();
        chain.chain[1].records[0].content = "forged".into();
        data.save_chain(&chain).unwrap();
        assert!(!chain::check(&data).unwrap());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        init::run(init_args(dir.path(), StrategyKind::ProofOfStake)).unwrap();
        assert!(init::run(init_args(dir.path(), StrategyKind::ProofOfStake)).is_err());

        let mut args = init_args(dir.path(), StrategyKind::ProofOfStake);
        args.force = true;
        init::run(args).unwrap();
        assert!(fs::metadata(dir.path().join("keys/node.json")).is_ok());
    }

    #[test]
    fn test_proof_of_stake_mint_and_check() {
        let dir = tempdir().unwrap();
        init::run(init_args(dir.path(), StrategyKind::ProofOfStake)).unwrap();
        let data = DataDir::new(dir.path());
        record::add_record(&data, 0, "minted").unwrap();

        let mined = block::mine(&data, false).unwrap();
        assert!(mined[0].signature.is_some());
        assert!(chain::check(&data).unwrap());

        let mut chain = data.load_chain().unwrap();
        chain.chain[1].signature = None;
        data.save_chain(&chain).unwrap();
        assert!(!chain::check(&data).unwrap());
    }

    #[test]
    fn test_untrusted_authority_node_cannot_mine() {
        let dir = tempdir().unwrap();
        init::run(init_args(dir.path(), StrategyKind::Authority)).unwrap();
        let data = DataDir::new(dir.path());
        record::add_record(&data, 0, "tx").unwrap();
        assert!(block::mine(&data, false).is_err());
    }

    #[test]
    fn test_trusted_authority_node_seals_blocks() {
        let dir = tempdir().unwrap();
        let mut args = init_args(dir.path(), StrategyKind::Authority);
        args.trusted = true;
        init::run(args).unwrap();
        let data = DataDir::new(dir.path());
        record::add_record(&data, 0, "tx").unwrap();

        let mined = block::mine(&data, false).unwrap();
        assert!(mined[0].signature.is_some());
        assert!(chain::check(&data).unwrap());
    }
}
