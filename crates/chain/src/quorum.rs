//! Proof-of-stake quorum rounds.
//!
//! A minted block is shown to the validator committee. Each member checks,
//! without mutating anything, whether the block would enter its chain. When
//! strictly more than half of all participants endorse it, every participant
//! persists the block; otherwise nobody does.
//!
//! [`QuorumRound`] runs that exchange between endorsers in one process.
//! Across the bus the endorsements travel inside the block as signed tokens,
//! and [`Committee::tally`] counts them.

use crate::pending::PendingBlockQueue;
use crate::repository::ChainRepository;
use crate::services;
use crate::strategy::SealClaim;
use parking_lot::RwLock;
use peerchain_consensus::{quorum_reached, tally_ballots, vote_for_validators, StakeRegister};
use peerchain_core::{Block, PendingBlock};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A participant in a quorum round.
pub trait Endorser: Send + Sync {
    /// Address the participant is known by in the stake register.
    fn address(&self) -> &str;

    /// Whether the block would be admitted, checked without side effects.
    fn endorse(&self, block: &Block) -> bool;

    /// Store the block after quorum. Returns whether it was taken.
    fn persist(&self, block: &Block) -> bool;
}

/// Elect the committee from every participant's top-K ballot.
pub fn elect_committee(ballots: &[Vec<String>], committee_size: usize) -> Vec<String> {
    tally_ballots(ballots, committee_size)
}

/// Outcome of one quorum round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumOutcome {
    pub accepts: usize,
    pub participants: usize,
    pub accepted: bool,
    /// Participants that failed to store the block after quorum.
    pub refused: Vec<String>,
}

/// The validator committee for one block and the participant count its
/// quorum is measured against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committee {
    pub members: Vec<String>,
    pub participants: usize,
}

impl Committee {
    /// Top-K positive stakeholders out of every registered address.
    ///
    /// `members` is empty when nobody holds positive stake.
    pub fn elect(stakes: &StakeRegister, committee_size: usize) -> Self {
        let ballot = vote_for_validators(stakes, committee_size);
        Self {
            members: elect_committee(&[ballot], committee_size),
            participants: stakes.len(),
        }
    }

    /// A forger validating its own blocks.
    pub fn solo(forger: &str) -> Self {
        Self {
            members: vec![forger.to_string()],
            participants: 1,
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.members.iter().any(|m| m == address)
    }

    /// Count the distinct members vouching for `block`: the forger's seal
    /// when the forger sits on the committee, plus every endorsement token
    /// that verifies against a member's key and covers the block's hash.
    pub fn tally(&self, block: &Block, forger: &str) -> QuorumOutcome {
        let mut endorsers = BTreeSet::new();
        if self.contains(forger) {
            endorsers.insert(forger.to_string());
        }
        for token in &block.endorsements {
            match SealClaim::verify(token, block) {
                Ok(address) if self.contains(&address) => {
                    endorsers.insert(address);
                }
                Ok(address) => {
                    debug!(index = block.index, endorser = %address, "Endorsement from outside the committee")
                }
                Err(e) => debug!(index = block.index, "Ignoring endorsement: {}", e),
            }
        }

        let accepts = endorsers.len();
        QuorumOutcome {
            accepts,
            participants: self.participants,
            accepted: quorum_reached(accepts, self.participants),
            refused: Vec::new(),
        }
    }
}

/// One proposal put to a committee.
pub struct QuorumRound<'a> {
    committee: Vec<&'a dyn Endorser>,
    participants: Vec<&'a dyn Endorser>,
}

impl<'a> QuorumRound<'a> {
    pub fn new(committee: Vec<&'a dyn Endorser>, participants: Vec<&'a dyn Endorser>) -> Self {
        Self {
            committee,
            participants,
        }
    }

    /// Pick the committee out of `participants` by address.
    pub fn with_committee(participants: Vec<&'a dyn Endorser>, committee: &[String]) -> Self {
        let members = participants
            .iter()
            .copied()
            .filter(|p| committee.iter().any(|c| c == p.address()))
            .collect();
        Self::new(members, participants)
    }

    /// Collect endorsements and persist on every participant iff quorum.
    pub fn run(&self, block: &Block) -> QuorumOutcome {
        let accepts = self
            .committee
            .iter()
            .filter(|member| {
                let endorsed = member.endorse(block);
                debug!(index = block.index, member = member.address(), endorsed, "Endorsement");
                endorsed
            })
            .count();
        let participants = self.participants.len();
        let accepted = quorum_reached(accepts, participants);

        let mut refused = Vec::new();
        if accepted {
            for participant in &self.participants {
                if !participant.persist(block) {
                    warn!(
                        index = block.index,
                        participant = participant.address(),
                        "Accepted block was not stored"
                    );
                    refused.push(participant.address().to_string());
                }
            }
            info!(index = block.index, accepts, participants, "Block accepted by quorum");
        } else {
            info!(index = block.index, accepts, participants, "Block rejected by quorum");
        }

        QuorumOutcome {
            accepts,
            participants,
            accepted,
            refused,
        }
    }
}

/// A self-contained proof-of-stake validator with its own chain, queue and
/// stake view.
#[derive(Debug)]
pub struct ValidatorNode {
    address: String,
    repo: ChainRepository,
    queue: PendingBlockQueue,
    stakes: RwLock<StakeRegister>,
    committee_size: usize,
    side_links: usize,
}

impl ValidatorNode {
    pub fn new(address: impl Into<String>, genesis: Block, committee_size: usize, side_links: usize) -> Self {
        Self {
            address: address.into(),
            repo: ChainRepository::new(genesis),
            queue: PendingBlockQueue::new(),
            stakes: RwLock::new(StakeRegister::new()),
            committee_size,
            side_links,
        }
    }

    pub fn repository(&self) -> &ChainRepository {
        &self.repo
    }

    pub fn queue(&self) -> &PendingBlockQueue {
        &self.queue
    }

    pub fn update_stake(&self, address: &str, delta: f64) {
        self.stakes.write().update_stake(address, delta);
    }

    /// This node's ballot: the top-K addresses of its stake view.
    pub fn choose_validators(&self) -> Vec<String> {
        vote_for_validators(&self.stakes.read(), self.committee_size)
    }

    pub fn register_new_pending_transaction(&self, pending: PendingBlock) -> u64 {
        services::add_pending_block(&self.queue, &self.repo, pending)
    }

    pub fn mint_block(&self) -> Option<Block> {
        services::mint_block(&self.queue, &self.repo, self.side_links)
    }

    /// Whether `block` would be admitted to this node's chain.
    pub fn add_or_reject_block(&self, block: &Block) -> bool {
        block.hash.as_deref() == Some(block.compute_hash().as_str())
            && self.repo.check_admission(block).is_ok()
    }
}

impl Endorser for ValidatorNode {
    fn address(&self) -> &str {
        &self.address
    }

    fn endorse(&self, block: &Block) -> bool {
        self.add_or_reject_block(block)
    }

    fn persist(&self, block: &Block) -> bool {
        services::add_block_v2(&self.repo, block.clone(), &self.address)
    }
}
