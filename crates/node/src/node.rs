//! Node state and topic handlers.
//!
//! A [`Node`] owns one chain repository and one pending queue and reacts to
//! envelopes from the bus. Handlers never block on mining; the worker in
//! [`crate::miner`] does that.
//!
//! Under proof of stake the worker publishes its minted block on
//! `chain.event.block_proposed` and waits for committee members to answer on
//! `chain.event.block_endorsed` before it commits the block.

use crate::bus::{Envelope, Topic, Transport};
use crate::error::Result;
use crate::publisher::{AuthorityHello, Endorsement, NewNode, Publisher};
use parking_lot::{Condvar, Mutex};
use peerchain_chain::{
    services, AuthorityStrategy, ChainRepository, ConsensusStrategy, KnownMiners, NodeConfig,
    PendingBlockQueue, ProofOfStakeStrategy, ProofOfWorkStrategy, StrategyKind,
};
use peerchain_consensus::{AddressAuthority, SignedAuthority, SystemAuthority};
use peerchain_core::{Block, Blockchain, PendingBlock, Record, SigningAuthority, Vote};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Mining work currently running on the worker.
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub index: u64,
    pub cancel: Arc<AtomicBool>,
}

/// One ledger node.
pub struct Node {
    node_id: String,
    config: NodeConfig,
    repo: Arc<ChainRepository>,
    queue: Arc<PendingBlockQueue>,
    strategy: Arc<dyn ConsensusStrategy>,
    authority: Arc<dyn SystemAuthority>,
    miners: Arc<KnownMiners>,
    publisher: Publisher,
    votes: Mutex<HashMap<String, usize>>,
    in_flight: Mutex<Option<InFlight>>,
    proposal: Mutex<Option<Block>>,
    proposal_ready: Condvar,
}

impl Node {
    /// Build a node from `config`, seeding the chain with the strategy's
    /// genesis.
    ///
    /// Without a `signer`, authority proofs fall back to the bare address.
    pub fn new(
        config: NodeConfig,
        signer: Option<SigningAuthority>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let node_id = match (&signer, config.node_id.is_empty()) {
            (Some(signer), true) => signer.address(),
            _ => config.node_id.clone(),
        };

        let miners = Arc::new(KnownMiners::new(config.known_miners.iter().cloned()));
        if config.trusted {
            miners.insert(&node_id);
        }

        let authority: Arc<dyn SystemAuthority> = match &signer {
            Some(signer) => Arc::new(SignedAuthority::new(signer.clone(), config.trusted)),
            None => Arc::new(AddressAuthority::new(config.trusted)),
        };

        let strategy: Arc<dyn ConsensusStrategy> = match config.strategy {
            StrategyKind::ProofOfWork => {
                Arc::new(ProofOfWorkStrategy::new(config.difficulty, config.side_links))
            }
            StrategyKind::Authority => Arc::new(AuthorityStrategy::new(
                config.difficulty,
                config.side_links,
                signer.filter(|_| config.trusted),
                Arc::clone(&miners),
            )),
            StrategyKind::ProofOfStake => {
                let pos =
                    ProofOfStakeStrategy::new(config.side_links, config.committee_size, signer);
                for (address, stake) in &config.stakes {
                    pos.update_stake(address, *stake);
                }
                Arc::new(pos)
            }
        };

        let genesis = strategy.genesis(config.genesis_timestamp);
        info!(node_id = %node_id, strategy = %config.strategy, "Node created");

        Self {
            publisher: Publisher::new(transport, node_id.clone()),
            node_id,
            repo: Arc::new(ChainRepository::new(genesis)),
            queue: Arc::new(PendingBlockQueue::new()),
            strategy,
            authority,
            miners,
            config,
            votes: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(None),
            proposal: Mutex::new(None),
            proposal_ready: Condvar::new(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<ChainRepository> {
        &self.repo
    }

    pub fn queue(&self) -> &Arc<PendingBlockQueue> {
        &self.queue
    }

    pub fn strategy(&self) -> &Arc<dyn ConsensusStrategy> {
        &self.strategy
    }

    pub fn miners(&self) -> &Arc<KnownMiners> {
        &self.miners
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn is_trusted(&self) -> bool {
        self.authority.is_trusted()
    }

    /// Replace the seeded chain with a stored one after the strategy has
    /// checked every block.
    pub fn restore(&self, chain: Blockchain) -> Result<()> {
        chain
            .chain
            .iter()
            .try_for_each(|block| self.strategy.check(block))?;
        services::set_chain(chain, &self.repo, &self.strategy.proof_of_work())?;
        Ok(())
    }

    /// Enqueue a record locally, bypassing the bus.
    pub fn add_record(&self, record: Record) -> u64 {
        self.add_pending(PendingBlock::new(vec![record]))
    }

    pub fn add_pending(&self, pending: PendingBlock) -> u64 {
        services::add_pending_block(&self.queue, &self.repo, pending)
    }

    pub fn get_authority_proof(&self) -> Result<String> {
        Ok(self.authority.get_proof(&self.node_id)?)
    }

    /// Register an announced authority if its proof verifies.
    pub fn add_authority_node(&self, node_id: &str, proof: &str) -> bool {
        self.miners.add_authority_node(node_id, proof, self.authority.as_ref())
    }

    /// Pick a random known miner to vote for.
    pub fn vote_for_miner(&self) -> Option<String> {
        let miner = self.miners.choose();
        if miner.is_none() {
            error!("No known miners to vote for");
        }
        miner
    }

    /// Tell the network this node exists.
    pub fn announce(&self) -> Result<()> {
        self.publisher.notify_new_node(&self.node_id)?;
        if self.is_trusted() {
            let proof = self.get_authority_proof()?;
            self.publisher.notify_authority_hello(&self.node_id, &proof)?;
        }
        Ok(())
    }

    /// Route one envelope to its handler.
    pub fn handle(&self, envelope: &Envelope) -> Result<()> {
        let from_self = !envelope.sender.is_empty() && envelope.sender == self.node_id;
        match envelope.topic {
            Topic::CommandMine => self.handle_mine(envelope.decode()?),
            Topic::CommandShowChain => self.handle_show_chain(),
            Topic::BlockMined if !from_self => self.handle_block_mined(envelope.decode()?),
            Topic::SetChain if !from_self => self.handle_set_chain(envelope.decode()?),
            Topic::NodeVoted => self.handle_node_voted(envelope.decode()?),
            Topic::AuthorityHello => {
                self.handle_authority_hello(envelope.decode()?);
                Ok(())
            }
            Topic::NewNode if !from_self => self.handle_new_node(envelope.decode()?),
            Topic::BlockProposed if !from_self => self.handle_block_proposed(envelope.decode()?),
            Topic::BlockEndorsed => {
                self.handle_block_endorsed(envelope.decode()?);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `chain.command.mine`: enqueue the record, or vote for a miner when
    /// authorities decide.
    pub fn handle_mine(&self, record: Record) -> Result<()> {
        if self.strategy.kind() != StrategyKind::Authority {
            self.add_record(record);
            return Ok(());
        }
        if self.is_trusted() {
            debug!("Authority node waits for votes");
            return Ok(());
        }
        let Some(miner) = self.vote_for_miner() else {
            return Ok(());
        };
        info!(miner = %miner, "Voting for miner");
        self.publisher.notify_node_voted(&Vote::new(miner, vec![record]))
    }

    pub fn handle_show_chain(&self) -> Result<()> {
        self.publisher
            .notify_event_show_chain(&services::show_chain(&self.repo))
    }

    /// `chain.event.block_mined`: check and store a peer's block, and cancel
    /// local work it makes obsolete.
    pub fn handle_block_mined(&self, block: Block) -> Result<()> {
        let index = block.index;
        match self.strategy.accept(&self.repo, block) {
            Ok(_) => {
                self.cancel_mining_up_to(index);
                Ok(())
            }
            Err(e) if e.is_previous_hash_mismatch() => {
                warn!(index, "Ignoring block that does not extend the chain: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `chain.event.set_chain`: adopt a strictly longer chain the strategy
    /// accepts block by block.
    pub fn handle_set_chain(&self, chain: Blockchain) -> Result<()> {
        let replaced = self.strategy.reconcile(&self.repo, chain)?;
        if replaced {
            self.cancel_mining_up_to(u64::MAX);
        }
        Ok(())
    }

    /// `chain.event.node_voted`: mine the voted records once enough votes
    /// for this node arrive.
    pub fn handle_node_voted(&self, vote: Vote) -> Result<()> {
        if vote.node_id != self.node_id {
            return Ok(());
        }
        let key = serde_json::to_string(&vote.records).unwrap_or_default();
        let reached = {
            let mut votes = self.votes.lock();
            let count = votes.entry(key.clone()).or_default();
            *count += 1;
            let reached = *count >= self.config.votes_required;
            if reached {
                votes.remove(&key);
            }
            reached
        };
        if reached {
            info!("Nodes voted for me. Adding pending block.");
            self.add_pending(PendingBlock::new(vote.records));
        }
        Ok(())
    }

    pub fn handle_authority_hello(&self, hello: AuthorityHello) {
        self.add_authority_node(&hello.node_id, &hello.proof);
    }

    /// `chain.event.new_node`: share the chain and, if trusted, introduce
    /// this node as an authority.
    pub fn handle_new_node(&self, new_node: NewNode) -> Result<()> {
        debug!(node_id = %new_node.node_id, "New node joined");
        self.publisher
            .notify_set_chain(&services::show_chain(&self.repo))?;
        if self.is_trusted() {
            let proof = self.get_authority_proof()?;
            self.publisher.notify_authority_hello(&self.node_id, &proof)?;
        }
        Ok(())
    }

    /// `chain.event.block_proposed`: endorse a peer's proposal when this
    /// node sits on its committee.
    pub fn handle_block_proposed(&self, block: Block) -> Result<()> {
        let index = block.index;
        match self.strategy.endorse(&self.repo, &block) {
            Ok(Some(token)) => {
                debug!(index, "Endorsing proposed block");
                self.publisher.notify_block_endorsed(block.hash_str(), &token)
            }
            Ok(None) => Ok(()),
            Err(e) => {
                debug!(index, "Not endorsing proposed block: {}", e);
                Ok(())
            }
        }
    }

    /// `chain.event.block_endorsed`: attach the token to the open proposal.
    /// The strategy sorts out which tokens count.
    pub fn handle_block_endorsed(&self, endorsement: Endorsement) {
        let mut proposal = self.proposal.lock();
        let Some(block) = proposal.as_mut() else {
            return;
        };
        if block.hash.as_deref() != Some(endorsement.hash.as_str())
            || block.endorsements.contains(&endorsement.token)
        {
            return;
        }
        block.endorsements.push(endorsement.token);
        drop(proposal);
        self.proposal_ready.notify_all();
    }

    /// Publish `block` and wait until its endorsements satisfy the strategy.
    ///
    /// Returns `Ok(None)` when `cancel` is raised or the endorsement timeout
    /// passes first.
    pub(crate) fn gather_endorsements(
        &self,
        block: Block,
        cancel: &AtomicBool,
    ) -> Result<Option<Block>> {
        if !self.strategy.needs_endorsements(&block)? {
            return Ok(Some(block));
        }
        let index = block.index;
        *self.proposal.lock() = Some(block.clone());
        if let Err(e) = self.publisher.notify_block_proposed(&block) {
            self.proposal.lock().take();
            return Err(e);
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.endorsement_timeout_ms);
        let mut proposal = self.proposal.lock();
        let mut timed_out = false;
        loop {
            let needs = match proposal.as_ref() {
                Some(candidate) => self.strategy.needs_endorsements(candidate),
                None => return Ok(None),
            };
            match needs {
                Ok(false) => return Ok(proposal.take()),
                Ok(true) => {}
                Err(e) => {
                    proposal.take();
                    return Err(e.into());
                }
            }
            if cancel.load(Ordering::Relaxed) {
                debug!(index, "Proposal withdrawn");
                proposal.take();
                return Ok(None);
            }
            if timed_out {
                let endorsements = proposal.as_ref().map_or(0, |b| b.endorsements.len());
                warn!(index, endorsements, "No quorum before the endorsement timeout");
                proposal.take();
                return Ok(None);
            }
            timed_out = self
                .proposal_ready
                .wait_until(&mut proposal, deadline)
                .timed_out();
        }
    }

    pub(crate) fn begin_mining(&self, index: u64) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        *self.in_flight.lock() = Some(InFlight {
            index,
            cancel: Arc::clone(&cancel),
        });
        cancel
    }

    pub(crate) fn end_mining(&self) {
        self.in_flight.lock().take();
    }

    pub(crate) fn cancel_mining_up_to(&self, index: u64) {
        if let Some(in_flight) = self.in_flight.lock().as_ref() {
            if in_flight.index <= index {
                debug!(index = in_flight.index, "Cancelling obsolete mining");
                in_flight.cancel.store(true, Ordering::Relaxed);
            }
        }
        // Wake a worker waiting on endorsements
        drop(self.proposal.lock());
        self.proposal_ready.notify_all();
    }
}
