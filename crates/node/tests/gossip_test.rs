use peerchain_chain::{NodeConfig, StrategyKind};
use peerchain_consensus::check_chain_validity;
use peerchain_core::{Blockchain, Keypair, Record, SigningAuthority};
use peerchain_node::{InMemoryBus, Node, NodeRuntime, Publisher, Topic, Transport};
use std::sync::Arc;
use std::time::Duration;

fn config(node_id: &str, strategy: StrategyKind) -> NodeConfig {
    NodeConfig {
        node_id: node_id.to_string(),
        strategy,
        difficulty: 8,
        mining_backoff_ms: 20,
        ..Default::default()
    }
}

fn start(bus: &Arc<InMemoryBus>, config: NodeConfig, signer: Option<SigningAuthority>) -> NodeRuntime {
    let node = Arc::new(Node::new(config, signer, bus.clone()));
    NodeRuntime::start(node, bus.as_ref()).unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mined_block_reaches_peer() {
    let bus = Arc::new(InMemoryBus::default());
    let a = start(&bus, config("a", StrategyKind::ProofOfWork), None);
    let b = start(&bus, config("b", StrategyKind::ProofOfWork), None);

    a.node().add_record(Record::new(0, "hello"));

    let (na, nb) = (a.node().clone(), b.node().clone());
    assert!(wait_until(|| nb.repository().len() == 2).await);
    assert_eq!(na.repository().get_chain(), nb.repository().get_chain());
    assert_eq!(
        na.repository().get_last_block().unwrap().hash,
        nb.repository().get_last_block().unwrap().hash
    );

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_joiner_adopts_longer_chain() {
    let bus = Arc::new(InMemoryBus::default());
    let a = start(&bus, config("a", StrategyKind::ProofOfWork), None);
    a.node().add_record(Record::new(0, "one"));
    a.node().add_record(Record::new(1, "two"));
    let na = a.node().clone();
    assert!(wait_until(|| na.repository().len() == 3).await);

    let b = start(&bus, config("b", StrategyKind::ProofOfWork), None);
    let nb = b.node().clone();
    assert!(wait_until(|| nb.repository().len() == 3).await);

    let chain = nb.repository().get_chain();
    assert!(check_chain_validity(&chain, &nb.strategy().proof_of_work()));
    assert_eq!(chain.chain[2].records[0].content, "two");

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_authority_vote_flow() {
    let bus = Arc::new(InMemoryBus::default());
    let voter = start(
        &bus,
        config("voter", StrategyKind::Authority),
        Some(SigningAuthority::new(Keypair::generate())),
    );

    let signer = SigningAuthority::new(Keypair::generate());
    let mut miner_config = config("", StrategyKind::Authority);
    miner_config.trusted = true;
    let miner = start(&bus, miner_config, Some(signer.clone()));

    let nv = voter.node().clone();
    assert!(wait_until(|| nv.miners().contains(&signer.address())).await);

    let client = Publisher::new(bus.clone(), "");
    client.notify_add_record(&Record::new(0, "voted")).unwrap();

    let nm = miner.node().clone();
    assert!(wait_until(|| nm.repository().len() == 2 && nv.repository().len() == 2).await);
    let tip = nv.repository().get_last_block().unwrap();
    assert!(tip.signature.is_some());
    assert_eq!(tip.records[0].content, "voted");
    assert!(nv.strategy().validate(&tip));

    voter.shutdown().await;
    miner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_proof_of_stake_committee_endorses_minted_block() {
    let bus = Arc::new(InMemoryBus::default());
    let keys: Vec<SigningAuthority> = (0..3)
        .map(|_| SigningAuthority::new(Keypair::generate()))
        .collect();
    let mut base = config("", StrategyKind::ProofOfStake);
    base.committee_size = 2;
    base.stakes = keys
        .iter()
        .zip([10.0, 30.0, 20.0])
        .map(|(key, stake)| (key.address(), stake))
        .collect();

    let nodes: Vec<NodeRuntime> = keys
        .iter()
        .map(|key| start(&bus, base.clone(), Some(key.clone())))
        .collect();

    // The forger holds the smallest stake and is not on the committee
    nodes[0].node().add_record(Record::new(0, "minted"));

    let handles: Vec<_> = nodes.iter().map(|n| n.node().clone()).collect();
    assert!(wait_until(|| handles.iter().all(|n| n.repository().len() == 2)).await);
    let tip = handles[1].repository().get_last_block().unwrap();
    assert_eq!(tip.nonce, 0);
    assert_eq!(tip.records[0].content, "minted");
    assert_eq!(tip.endorsements.len(), 2);
    for node in &handles {
        assert_eq!(node.repository().get_last_block().unwrap().hash, tip.hash);
    }

    for node in nodes {
        node.shutdown().await;
    }
}

#[tokio::test]
async fn test_show_chain_command() {
    let bus = Arc::new(InMemoryBus::default());
    let node = start(&bus, config("a", StrategyKind::ProofOfWork), None);
    let mut events = bus.subscribe();

    Publisher::new(bus.clone(), "").notify_show_chain().unwrap();

    let snapshot = loop {
        let envelope = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        if envelope.topic == Topic::ShowChain {
            break envelope.decode::<Blockchain>().unwrap();
        }
    };
    assert_eq!(snapshot, node.node().repository().get_chain());

    node.shutdown().await;
}
