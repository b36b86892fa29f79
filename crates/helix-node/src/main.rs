use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use helix_consensus::{PbftMachine, ValidatorInfo, ValidatorSet};
use helix_core::block::{DagBlock, DagBlockBody};
use helix_core::constants::{DAG_MAX_PARENTS, ORPHAN_PARENT_TIMEOUT_SECS};
use helix_core::transaction::Transaction;
use helix_core::types::{Address, BlockHash, Level};
use helix_core::vote::Step;
use helix_crypto::{SigningKeyPair, VrfKeyPair};
use helix_dag::{DagManager, Pool};
use helix_genesis::{apply_genesis, GenesisError, GenesisParams};
use helix_p2p::{
    DagBlockWithTxs, InboundEvent, OutboundCommand, P2pConfig, P2pHandle, P2pNetwork,
    PbftBlockWithVotes, StatusPayload, SyncDriver, WireMessage,
};
use helix_rpc::{RpcServer, RpcServerState};
use helix_state::{Finaliser, SimpleStateExecutor, Store};

#[derive(Parser)]
#[command(name = "helix-node", about = "A Helix full node")]
struct Args {
    /// Directory holding the node's database, identity and validator files.
    #[arg(long, default_value = "~/.helix")]
    data_dir: String,

    /// Multiaddr to listen for P2P connections on, overriding the default.
    #[arg(long)]
    p2p_listen: Option<String>,

    /// Multiaddrs of peers to bootstrap discovery from.
    #[arg(long)]
    bootstrap: Vec<String>,

    /// Address to bind the JSON-RPC server on.
    #[arg(long, default_value = "127.0.0.1:8545")]
    rpc_addr: String,

    /// Path to a genesis parameters file (defaults to `<data_dir>/genesis.json`).
    #[arg(long)]
    genesis_params: Option<PathBuf>,

    /// Path to a validator set file (defaults to `<data_dir>/validators.json`).
    #[arg(long)]
    validators: Option<PathBuf>,
}

/// A node's signing and VRF keypairs, persisted together as one keyfile —
/// the node's counterpart to a wallet keyfile.
#[derive(Serialize, Deserialize)]
struct NodeIdentity {
    signing: SigningKeyPair,
    vrf: VrfKeyPair,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Loads a node identity keyfile, or generates and persists a fresh one with
/// a loud warning — there is no other way for an operator to know a brand
/// new signing/VRF key was minted for this node.
fn load_or_generate_identity(path: &Path) -> Result<NodeIdentity> {
    if path.exists() {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading identity file {}", path.display()))?;
        let identity: NodeIdentity = serde_json::from_str(&data)
            .with_context(|| format!("parsing identity file {}", path.display()))?;
        return Ok(identity);
    }

    warn!(
        path = %path.display(),
        "no identity file found — generating a fresh node identity. \
         BACK UP this file; losing it loses the node's validator identity."
    );
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let identity = NodeIdentity {
        signing: SigningKeyPair::generate(),
        vrf: VrfKeyPair::generate(),
    };
    std::fs::write(path, serde_json::to_string_pretty(&identity)?)
        .with_context(|| format!("writing identity file {}", path.display()))?;
    Ok(identity)
}

/// Loads a validator set, or generates one containing only this node as a
/// single validator — the development-mode default, matching genesis
/// params' own "generated fresh on first boot, written back for
/// reproducibility" convention. A real deployment shares one validator file
/// across every node's `--validators` flag.
fn load_or_generate_validators(path: &Path, identity: &NodeIdentity) -> Result<ValidatorSet> {
    let infos: Vec<ValidatorInfo> = if path.exists() {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading validators file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing validators file {}", path.display()))?
    } else {
        warn!(
            path = %path.display(),
            "no validator set file found — defaulting to a single-validator set of this node"
        );
        let infos = vec![ValidatorInfo {
            address: identity.signing.address,
            vrf_key: identity.vrf.public.clone(),
            stake: 1,
        }];
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&infos)?)
            .with_context(|| format!("writing validators file {}", path.display()))?;
        infos
    };

    let mut set = ValidatorSet::new();
    for info in infos {
        set.add(info);
    }
    Ok(set)
}

/// Assembles a new DAG block on top of the current tip set, carrying as many
/// pending pool transactions as fit under the block gas limit. Returns
/// `None` if there is nothing new to say.
fn build_block(
    dag: &DagManager,
    pool: &Pool,
    signing: &SigningKeyPair,
    gas_limit: u64,
    now: i64,
) -> Option<(DagBlock, Vec<Transaction>)> {
    let tips = dag.tips();

    let (pivot, pivot_level) = match dag.pivot_tip() {
        Some(tip) => {
            let level = dag.get(&tip).map(|b| b.level()).unwrap_or(0);
            (tip, level)
        }
        None => (dag.finalized_anchor(), 0),
    };

    let mut other_tips: Vec<BlockHash> = tips.into_iter().filter(|h| *h != pivot).collect();
    other_tips.truncate(DAG_MAX_PARENTS - 1);
    let max_tip_level = other_tips
        .iter()
        .filter_map(|h| dag.get(h).map(|b| b.level()))
        .max()
        .unwrap_or(0);
    let level: Level = 1 + pivot_level.max(max_tip_level);

    let mut included = Vec::new();
    let mut gas_used = 0u64;
    for tx in pool.pending_transactions() {
        if gas_used + tx.gas_limit() > gas_limit {
            continue;
        }
        gas_used += tx.gas_limit();
        included.push(tx.clone());
    }

    if dag.pivot_tip().is_none() && included.is_empty() {
        return None;
    }

    let body = DagBlockBody {
        pivot,
        tips: other_tips,
        transactions: included.iter().map(|tx| tx.hash).collect(),
        level,
        timestamp: now,
    };
    let digest = body.signing_digest();
    let signature = signing.sign(&digest).ok()?;
    let mut block = DagBlock {
        body,
        signature,
        hash: BlockHash::zero(),
        sender: signing.address,
    };
    block.hash = block.compute_hash();
    Some((block, included))
}

/// Drives PBFT forward by one step, casting this node's vote for the current
/// step's target if sortition makes it eligible, and broadcasting it.
fn advance_pbft_step(
    pbft: &mut PbftMachine,
    dag: &DagManager,
    own_soft_vote: &mut Option<BlockHash>,
    outbound: &mpsc::Sender<OutboundCommand>,
) {
    let step = pbft.step();
    let target = match step {
        Step::Propose => dag.pivot_tip().unwrap_or_else(BlockHash::zero),
        Step::Soft => {
            let target = pbft
                .soft_vote_target()
                .unwrap_or_else(|| dag.pivot_tip().unwrap_or_else(BlockHash::zero));
            *own_soft_vote = Some(target);
            target
        }
        Step::Certify => match pbft.certify_vote_target() {
            Some(target) => target,
            None => {
                pbft.advance_step();
                return;
            }
        },
        Step::Next => {
            if let Ok(Some(vote)) = pbft.on_timeout(*own_soft_vote) {
                let _ = outbound.try_send(OutboundCommand::Broadcast(WireMessage::PbftVote(vec![
                    vote,
                ])));
            }
            *own_soft_vote = None;
            return;
        }
    };

    match pbft.try_own_vote(target) {
        Ok(Some(vote)) => {
            let _ = outbound.try_send(OutboundCommand::Broadcast(WireMessage::PbftVote(vec![
                vote,
            ])));
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, ?step, "failed to cast own vote"),
    }
    pbft.advance_step();
}

/// If PBFT has reached a certified commit for the current period, finalise
/// it and broadcast the resulting header so peers without DAG context can
/// still learn the period is final.
#[allow(clippy::too_many_arguments)]
fn try_finalize(
    pbft: &mut PbftMachine,
    dag: &mut DagManager,
    pool: &mut Pool,
    finaliser: &Finaliser<SimpleStateExecutor>,
    own_address: Address,
    now: i64,
    sync: &mut SyncDriver,
    outbound: &mpsc::Sender<OutboundCommand>,
) {
    let Some((anchor, votes)) = pbft.committed_anchor() else {
        return;
    };
    let period = pbft.period();
    let author = dag.get(&anchor).map(|b| b.sender).unwrap_or(own_address);
    let order = dag.dag_order_below(anchor);

    match finaliser.finalize_period(dag, pool, anchor, period, author, now, votes.clone()) {
        Ok(header) => {
            info!(period, %anchor, blocks = order.len(), "finalised period");
            pbft.commit(anchor);
            sync.record_pbft_progress(period);
            let _ = outbound.try_send(OutboundCommand::Broadcast(WireMessage::NewPbftBlock(
                PbftBlockWithVotes {
                    header,
                    anchor,
                    blocks: order,
                    certified_votes: votes,
                },
            )));
        }
        Err(e) => warn!(error = %e, period, "failed to finalise committed period"),
    }
}

fn handle_wire_message(
    message: WireMessage,
    dag: &mut DagManager,
    pool: &mut Pool,
    pbft: &mut PbftMachine,
    store: &Store,
) {
    match message {
        WireMessage::Transaction(txs) => {
            for tx in txs {
                let sender = tx.sender;
                let result = pool.submit_transaction(tx, |addr, nonce| {
                    addr == sender
                        && helix_state::replay::is_stale(store, addr, nonce).unwrap_or(false)
                });
                if let Err(e) = result {
                    debug!(error = %e, "rejected gossiped transaction");
                }
            }
        }
        WireMessage::NewDagBlock(DagBlockWithTxs { block, transactions })
        | WireMessage::DagBlock(DagBlockWithTxs { block, transactions }) => {
            for tx in transactions {
                let sender = tx.sender;
                let _ = pool.submit_transaction(tx, |addr, nonce| {
                    addr == sender
                        && helix_state::replay::is_stale(store, addr, nonce).unwrap_or(false)
                });
            }
            let now = current_timestamp();
            if let Err(e) = pool.submit_block(block, now) {
                debug!(error = %e, "rejected gossiped block");
            }
            pool.drain_ready(dag);
        }
        WireMessage::PbftVote(votes) | WireMessage::NextVotes(votes) => {
            for vote in votes {
                if let Err(e) = pbft.ingest_vote(vote) {
                    debug!(error = %e, "rejected gossiped vote");
                }
            }
        }
        WireMessage::NewPbftBlock(_) => {
            // Informational only: this node finalises from its own DAG/PBFT
            // state, not from trusting an unsolicited announcement.
        }
        _ => {}
    }
}

/// Answers a peer's point-to-point request, if this node can.
fn answer_request(
    message: WireMessage,
    store: &Store,
    dag: &DagManager,
    genesis_hash: BlockHash,
) -> Option<WireMessage> {
    match message {
        WireMessage::GetDagBlock(hash) => dag.get(&hash).map(|block| {
            WireMessage::DagBlock(DagBlockWithTxs {
                block: block.clone(),
                transactions: block
                    .body
                    .transactions
                    .iter()
                    .filter_map(|h| store.get_transaction(h).ok().flatten())
                    .collect(),
            })
        }),
        WireMessage::GetPbftBlock { start_period, count } => {
            let mut blocks = Vec::new();
            for period in start_period..start_period + count {
                let Ok(Some(header)) = store.final_header(period) else {
                    break;
                };
                let Ok(Some(data)) = store.period_data(period) else {
                    break;
                };
                blocks.push(PbftBlockWithVotes {
                    header,
                    anchor: data.anchor,
                    blocks: data.blocks,
                    certified_votes: data.certified_votes,
                });
            }
            Some(WireMessage::PbftBlock(blocks))
        }
        WireMessage::GetBlocksLevel { start_level, count } => {
            let mut blocks = Vec::new();
            for level in start_level..start_level + count {
                let Ok(hashes) = store.blocks_at_level(level) else {
                    break;
                };
                for hash in hashes {
                    if let Ok(Some(block)) = store.get_block(&hash) {
                        blocks.push(DagBlockWithTxs {
                            transactions: block
                                .body
                                .transactions
                                .iter()
                                .filter_map(|h| store.get_transaction(h).ok().flatten())
                                .collect(),
                            block,
                        });
                    }
                }
            }
            Some(WireMessage::Blocks(blocks))
        }
        WireMessage::Status(_) => {
            let latest_period = store.latest_period().unwrap_or(0);
            Some(WireMessage::Status(StatusPayload {
                protocol_version: 1,
                network_id: helix_core::constants::CHAIN_ID,
                genesis_hash,
                dag_max_level: dag.max_level(),
                pbft_chain_size: latest_period,
            }))
        }
        _ => None,
    }
}

fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let store = Store::open(data_dir.join("db")).context("opening store")?;

    let genesis_params_path = args
        .genesis_params
        .clone()
        .unwrap_or_else(|| data_dir.join("genesis.json"));
    let genesis_params =
        GenesisParams::load_or_default(&genesis_params_path).context("loading genesis params")?;

    match apply_genesis(&store, &genesis_params) {
        Ok(header) => info!(period = header.period, "applied genesis"),
        Err(GenesisError::AlreadyApplied) => info!("genesis already applied"),
        Err(e) => return Err(e.into()),
    }
    let genesis_hash = store
        .final_header(0)?
        .map(|h| h.hash())
        .unwrap_or_else(BlockHash::zero);

    let identity = load_or_generate_identity(&data_dir.join("identity.json"))?;
    let validators_path = args
        .validators
        .clone()
        .unwrap_or_else(|| data_dir.join("validators.json"));
    let validators = load_or_generate_validators(&validators_path, &identity)?;

    let own_address = identity.signing.address;
    // `SigningKeyPair` does not implement `Clone`: `PbftMachine` consumes it
    // by value, so block authoring gets its own copy derived from the same
    // secret rather than sharing the one PBFT owns.
    let block_signing = SigningKeyPair::from_raw(*identity.signing.secret_bytes())
        .context("rederiving block-signing keypair")?;

    let mut dag = DagManager::new(store.finalized_anchor()?);
    let mut pool = Pool::new(genesis_params.gas_limit);
    let start_period = store.latest_period()? + 1;
    let mut pbft = PbftMachine::new(
        identity.signing,
        identity.vrf,
        validators.clone(),
        start_period,
    );
    let finaliser = Finaliser::new(store.clone(), SimpleStateExecutor);

    let mut p2p_config = P2pConfig::default();
    if let Some(listen) = args.p2p_listen {
        p2p_config.listen_addr = listen;
    }
    p2p_config.bootstrap_peers = args.bootstrap;

    let (p2p_network, p2p_handle) = P2pNetwork::new(&p2p_config)?;
    tokio::spawn(p2p_network.run());
    let P2pHandle {
        outbound_tx,
        mut inbound_rx,
        local_peer_id,
    } = p2p_handle;
    let peer_multiaddr = format!("{}/p2p/{}", p2p_config.listen_addr, local_peer_id);
    info!(peer_id = %local_peer_id, listen = %p2p_config.listen_addr, "p2p network started");

    let mut sync = SyncDriver::new(dag.max_level(), store.latest_period()?);

    let (tx_sender, mut tx_receiver) = mpsc::channel::<Transaction>(256);
    let rpc_state = Arc::new(RpcServerState::new(
        store.clone(),
        validators,
        Some(tx_sender),
        Some(peer_multiaddr),
    ));
    let rpc_addr: SocketAddr = args.rpc_addr.parse().context("parsing --rpc-addr")?;
    let _rpc_handle = RpcServer::new(rpc_state).start(rpc_addr).await?;
    info!(addr = %rpc_addr, "rpc server started");

    let mut own_soft_vote: Option<BlockHash> = None;
    let mut step_deadline = Instant::now() + Duration::from_millis(pbft.step_deadline_ms());
    let mut block_tick = tokio::time::interval(Duration::from_secs(2));
    let mut orphan_tick = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            Some(tx) = tx_receiver.recv() => {
                let hash = tx.hash;
                let sender = tx.sender;
                let result = pool.submit_transaction(tx.clone(), |addr, nonce| {
                    addr == sender && helix_state::replay::is_stale(&store, addr, nonce).unwrap_or(false)
                });
                match result {
                    Ok(()) => {
                        let _ = outbound_tx
                            .send(OutboundCommand::Broadcast(WireMessage::Transaction(vec![tx])))
                            .await;
                    }
                    Err(e) => warn!(error = %e, %hash, "rejected rpc-submitted transaction"),
                }
            }

            Some(event) = inbound_rx.recv() => {
                match event {
                    InboundEvent::Gossip { message, .. } => {
                        handle_wire_message(message, &mut dag, &mut pool, &mut pbft, &store);
                    }
                    InboundEvent::Request { message, channel, .. } => {
                        if let Some(response) = answer_request(message, &store, &dag, genesis_hash) {
                            let _ = outbound_tx.send(OutboundCommand::Respond { channel, message: response }).await;
                        }
                    }
                    InboundEvent::PeerConnected(peer) => debug!(%peer, "peer connected"),
                    InboundEvent::PeerDisconnected(peer) => debug!(%peer, "peer disconnected"),
                }
                sync.record_dag_progress(dag.max_level());
                try_finalize(&mut pbft, &mut dag, &mut pool, &finaliser, own_address, current_timestamp(), &mut sync, &outbound_tx);
            }

            _ = tokio::time::sleep_until(step_deadline) => {
                advance_pbft_step(&mut pbft, &dag, &mut own_soft_vote, &outbound_tx);
                try_finalize(&mut pbft, &mut dag, &mut pool, &finaliser, own_address, current_timestamp(), &mut sync, &outbound_tx);
                step_deadline = Instant::now() + Duration::from_millis(pbft.step_deadline_ms());
            }

            _ = block_tick.tick() => {
                if let Some((block, transactions)) = build_block(&dag, &pool, &block_signing, genesis_params.gas_limit, current_timestamp()) {
                    let hash = block.hash;
                    if dag.insert(block.clone()).is_ok() {
                        let _ = outbound_tx
                            .send(OutboundCommand::Broadcast(WireMessage::NewDagBlock(
                                DagBlockWithTxs { block, transactions },
                            )))
                            .await;
                        sync.record_dag_progress(dag.max_level());
                        debug!(%hash, "produced dag block");
                    }
                }
            }

            _ = orphan_tick.tick() => {
                let expired = pool.expire_orphans(current_timestamp(), ORPHAN_PARENT_TIMEOUT_SECS as i64);
                if !expired.is_empty() {
                    debug!(count = expired.len(), "expired orphaned blocks");
                }
            }
        }
    }
}
