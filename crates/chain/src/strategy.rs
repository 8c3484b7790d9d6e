//! Selectable consensus strategies.
//!
//! Every strategy answers the same questions:
//! - `propose`: turn a pending block into a candidate block
//! - `check`: is an inbound block acceptable on its own merits
//! - `check_chain`: is a whole peer chain acceptable, block by block
//! - `finalize`: commit a locally proposed block
//!
//! Strategies keep their own difficulty and acceptance rules; the node only
//! talks to the trait.

use crate::miners::KnownMiners;
use crate::quorum::{Committee, QuorumOutcome};
use crate::repository::{Admission, ChainRepository};
use crate::services::{self, ChainError, Result};
use parking_lot::RwLock;
use peerchain_consensus::{validate_chain, ProofOfWork, StakeRegister};
use peerchain_core::{Block, Blockchain, PendingBlock, SigningAuthority, GENESIS_PREVIOUS_HASH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

/// Which consensus strategy a node runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    ProofOfWork,
    Authority,
    ProofOfStake,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::ProofOfWork => "proof_of_work",
            StrategyKind::Authority => "authority",
            StrategyKind::ProofOfStake => "proof_of_stake",
        };
        f.write_str(name)
    }
}

/// Build the genesis block sealed with `pow`.
pub fn seal_genesis(pow: &ProofOfWork, timestamp: u64) -> Block {
    let mut genesis = Block::new(0, GENESIS_PREVIOUS_HASH, Vec::new(), timestamp, Vec::new());
    genesis.hash = Some(pow.mine(&mut genesis));
    genesis
}

/// The contract shared by all consensus strategies.
pub trait ConsensusStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// The puzzle every block of this chain must satisfy.
    fn proof_of_work(&self) -> ProofOfWork;

    /// Genesis block every node of this deployment agrees on.
    fn genesis(&self, timestamp: u64) -> Block {
        seal_genesis(&self.proof_of_work(), timestamp)
    }

    /// Build a candidate block from `pending`.
    ///
    /// Returns `Ok(None)` when `cancel` is raised before a block is ready.
    fn propose(
        &self,
        repo: &ChainRepository,
        pending: PendingBlock,
        cancel: &AtomicBool,
    ) -> Result<Option<Block>>;

    /// Check an inbound block in isolation.
    fn check(&self, block: &Block) -> Result<()>;

    fn validate(&self, block: &Block) -> bool {
        self.check(block).is_ok()
    }

    /// Check a whole chain: linkage and proofs from genesis, then every
    /// block under [`ConsensusStrategy::check`].
    fn check_chain(&self, chain: &Blockchain) -> Result<()> {
        validate_chain(chain, &self.proof_of_work())?;
        chain.chain.iter().try_for_each(|block| self.check(block))
    }

    /// Adopt `peer` iff it is strictly longer than the local chain and
    /// passes [`ConsensusStrategy::check_chain`]. Returns whether the local
    /// chain was replaced.
    fn reconcile(&self, repo: &ChainRepository, peer: Blockchain) -> Result<bool> {
        let local = repo.len();
        if peer.length() <= local {
            debug!(peer = peer.length(), local, "Keeping local chain");
            return Ok(false);
        }
        self.check_chain(&peer)?;
        Ok(services::adopt_longer(peer, repo))
    }

    /// Whether `block` still needs committee endorsements before
    /// [`ConsensusStrategy::finalize`] can take it.
    fn needs_endorsements(&self, _block: &Block) -> Result<bool> {
        Ok(false)
    }

    /// Endorse a block a peer proposed. `Ok(None)` when this node has no
    /// say in it.
    fn endorse(&self, _repo: &ChainRepository, _block: &Block) -> Result<Option<String>> {
        Ok(None)
    }

    /// Check a block received from a peer and add it to the chain.
    fn accept(&self, repo: &ChainRepository, block: Block) -> Result<Admission> {
        self.check(&block)?;
        let index = block.index;
        let admission = repo.add_or_replace(block)?;
        info!(index, ?admission, "Block added to the chain");
        Ok(admission)
    }

    /// Commit a block this node proposed. Returns whether it was accepted.
    fn finalize(&self, repo: &ChainRepository, block: Block) -> Result<bool> {
        self.accept(repo, block).map(|_| true)
    }
}

/// Plain proof-of-work: any node may mine, the puzzle decides.
#[derive(Debug, Clone)]
pub struct ProofOfWorkStrategy {
    pow: ProofOfWork,
    side_links: usize,
}

impl ProofOfWorkStrategy {
    pub fn new(difficulty: u32, side_links: usize) -> Self {
        Self {
            pow: ProofOfWork::new(difficulty),
            side_links,
        }
    }
}

impl ConsensusStrategy for ProofOfWorkStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ProofOfWork
    }

    fn proof_of_work(&self) -> ProofOfWork {
        self.pow
    }

    fn propose(
        &self,
        repo: &ChainRepository,
        pending: PendingBlock,
        cancel: &AtomicBool,
    ) -> Result<Option<Block>> {
        Ok(services::mine_pending(repo, pending, &self.pow, self.side_links, cancel))
    }

    fn check(&self, block: &Block) -> Result<()> {
        if !self.pow.is_valid_proof(block, block.hash_str()) {
            return Err(ChainError::InvalidProof { index: block.index });
        }
        Ok(())
    }
}

/// Claim signed into a block seal or an endorsement: `node_id` vouches for
/// `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealClaim {
    pub node_id: String,
    pub hash: String,
}

impl SealClaim {
    /// Sign a claim over `block`'s hash.
    pub fn issue(signer: &SigningAuthority, block: &Block) -> Result<String> {
        let claim = SealClaim {
            node_id: signer.address(),
            hash: block.hash_str().to_string(),
        };
        Ok(signer.sign(&claim)?)
    }

    /// Verify `token` against the key of the node it names and check that it
    /// covers `block`'s hash. Returns that node's address.
    pub fn verify(token: &str, block: &Block) -> Result<String> {
        let claimed: SealClaim = SigningAuthority::claims_unverified(token)?;
        let claim: SealClaim = SigningAuthority::verify_for_address(token, &claimed.node_id)?;
        if claim.hash != block.hash_str() {
            return Err(ChainError::InvalidSeal {
                index: block.index,
                reason: "token covers a different hash".to_string(),
            });
        }
        Ok(claim.node_id)
    }
}

fn no_signing_key(index: u64) -> ChainError {
    ChainError::InvalidSeal {
        index,
        reason: "node holds no signing key".to_string(),
    }
}

/// Proof-of-work mined by known authority nodes, each block sealed by its
/// miner.
#[derive(Debug, Clone)]
pub struct AuthorityStrategy {
    pow: ProofOfWork,
    side_links: usize,
    signer: Option<SigningAuthority>,
    miners: Arc<KnownMiners>,
}

impl AuthorityStrategy {
    /// `signer` is required to propose; nodes without one can only check.
    pub fn new(
        difficulty: u32,
        side_links: usize,
        signer: Option<SigningAuthority>,
        miners: Arc<KnownMiners>,
    ) -> Self {
        Self {
            pow: ProofOfWork::new(difficulty),
            side_links,
            signer,
            miners,
        }
    }

    pub fn miners(&self) -> &Arc<KnownMiners> {
        &self.miners
    }

    /// Attach this node's seal to a hashed block.
    pub fn seal(&self, block: &mut Block) -> Result<()> {
        let signer = self.signer.as_ref().ok_or_else(|| no_signing_key(block.index))?;
        block.signature = Some(SealClaim::issue(signer, block)?);
        Ok(())
    }

    fn check_seal(&self, block: &Block) -> Result<()> {
        let invalid = |reason: &str| ChainError::InvalidSeal {
            index: block.index,
            reason: reason.to_string(),
        };
        let token = block.signature.as_deref().ok_or_else(|| invalid("missing seal"))?;
        let node_id = SealClaim::verify(token, block)?;
        if !self.miners.contains(&node_id) {
            return Err(invalid("sealed by an unknown authority"));
        }
        Ok(())
    }
}

impl ConsensusStrategy for AuthorityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Authority
    }

    fn proof_of_work(&self) -> ProofOfWork {
        self.pow
    }

    fn propose(
        &self,
        repo: &ChainRepository,
        pending: PendingBlock,
        cancel: &AtomicBool,
    ) -> Result<Option<Block>> {
        let Some(mut block) =
            services::mine_pending(repo, pending, &self.pow, self.side_links, cancel)
        else {
            return Ok(None);
        };
        self.seal(&mut block)?;
        Ok(Some(block))
    }

    /// Genesis is never sealed.
    fn check(&self, block: &Block) -> Result<()> {
        if !self.pow.is_valid_proof(block, block.hash_str()) {
            return Err(ChainError::InvalidProof { index: block.index });
        }
        if block.is_genesis() {
            return Ok(());
        }
        self.check_seal(block)
    }
}

/// Stake-weighted minting with committee quorum.
///
/// A minted block carries its forger's seal. Committee members elected from
/// the stake register endorse it with tokens over its hash, and the block is
/// valid once the endorsing members outnumber half of the registered
/// participants. The forger must hold positive stake. While nobody holds
/// positive stake every forger validates its own blocks.
pub struct ProofOfStakeStrategy {
    side_links: usize,
    committee_size: usize,
    signer: Option<SigningAuthority>,
    stakes: RwLock<StakeRegister>,
}

impl ProofOfStakeStrategy {
    /// `signer` is required to mint and to endorse; nodes without one can
    /// only check.
    pub fn new(side_links: usize, committee_size: usize, signer: Option<SigningAuthority>) -> Self {
        Self {
            side_links,
            committee_size,
            signer,
            stakes: RwLock::new(StakeRegister::new()),
        }
    }

    /// Address blocks and endorsements from this node are signed with.
    pub fn address(&self) -> Option<String> {
        self.signer.as_ref().map(SigningAuthority::address)
    }

    pub fn stakes(&self) -> StakeRegister {
        self.stakes.read().clone()
    }

    pub fn update_stake(&self, address: &str, delta: f64) {
        self.stakes.write().update_stake(address, delta);
    }

    /// Committee that judges block `index` forged by `forger`.
    fn committee(&self, forger: &str, index: u64) -> Result<Committee> {
        let stakes = self.stakes.read();
        let committee = Committee::elect(&stakes, self.committee_size);
        if committee.members.is_empty() {
            return Ok(Committee::solo(forger));
        }
        if stakes.stake_of(forger) <= 0.0 {
            return Err(ChainError::InvalidSeal {
                index,
                reason: format!("forger {forger} holds no stake"),
            });
        }
        Ok(committee)
    }

    /// Check the hash and the forger's seal; returns the forger with the
    /// committee that judges the block.
    fn check_proposal(&self, block: &Block) -> Result<(String, Committee)> {
        if block.hash.as_deref() != Some(block.compute_hash().as_str()) {
            return Err(ChainError::InvalidProof { index: block.index });
        }
        let seal = block.signature.as_deref().ok_or_else(|| ChainError::InvalidSeal {
            index: block.index,
            reason: "missing seal".to_string(),
        })?;
        let forger = SealClaim::verify(seal, block)?;
        let committee = self.committee(&forger, block.index)?;
        Ok((forger, committee))
    }

    /// Count the committee members vouching for `block`.
    pub fn tally(&self, block: &Block) -> Result<QuorumOutcome> {
        let (forger, committee) = self.check_proposal(block)?;
        Ok(committee.tally(block, &forger))
    }
}

impl fmt::Debug for ProofOfStakeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofOfStakeStrategy")
            .field("address", &self.address())
            .field("committee_size", &self.committee_size)
            .field("stakeholders", &self.stakes.read().len())
            .finish()
    }
}

impl ConsensusStrategy for ProofOfStakeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ProofOfStake
    }

    /// Minting has no puzzle.
    fn proof_of_work(&self) -> ProofOfWork {
        ProofOfWork::new(0)
    }

    fn propose(
        &self,
        repo: &ChainRepository,
        pending: PendingBlock,
        _cancel: &AtomicBool,
    ) -> Result<Option<Block>> {
        let signer = self.signer.as_ref().ok_or_else(|| no_signing_key(pending.index))?;
        let mut block = services::mint_pending(repo, pending, self.side_links);
        block.signature = Some(SealClaim::issue(signer, &block)?);
        debug!(index = block.index, forger = %signer.address(), "Minted block");
        Ok(Some(block))
    }

    /// Genesis carries no seal; every other block needs quorum evidence.
    fn check(&self, block: &Block) -> Result<()> {
        if block.is_genesis() {
            if block.hash.as_deref() != Some(block.compute_hash().as_str()) {
                return Err(ChainError::InvalidProof { index: block.index });
            }
            return Ok(());
        }
        let outcome = self.tally(block)?;
        if !outcome.accepted {
            return Err(ChainError::NoQuorum {
                index: block.index,
                accepts: outcome.accepts,
                participants: outcome.participants,
            });
        }
        Ok(())
    }

    fn needs_endorsements(&self, block: &Block) -> Result<bool> {
        Ok(!self.tally(block)?.accepted)
    }

    /// Committee members endorse a proposal their own chain would admit.
    fn endorse(&self, repo: &ChainRepository, block: &Block) -> Result<Option<String>> {
        let Some(signer) = self.signer.as_ref() else {
            return Ok(None);
        };
        let (_, committee) = self.check_proposal(block)?;
        if !committee.contains(&signer.address()) {
            return Ok(None);
        }
        repo.check_admission(block)?;
        Ok(Some(SealClaim::issue(signer, block)?))
    }
}
