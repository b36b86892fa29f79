use helix_core::constants::{DEAD_PEER_TIMEOUT_SECS, IDLE_PEER_TIMEOUT_SECS, ORPHAN_PARENT_TIMEOUT_SECS};

/// Configuration for the Helix P2P network.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Local listen address (e.g. "/ip4/0.0.0.0/tcp/7777").
    pub listen_addr: String,
    /// Bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Protocol version string advertised to peers.
    pub protocol_version: String,
    /// GossipSub topic for broadcast packets (DAG blocks, transactions, votes).
    pub gossip_topic: String,
    /// Seconds without any response to an outstanding request before a peer
    /// is considered idle and disconnected (§5).
    pub idle_peer_timeout_secs: u64,
    /// Seconds without any message at all before a peer is considered dead
    /// and disconnected (§5).
    pub dead_peer_timeout_secs: u64,
    /// Seconds to wait for an orphan block's missing parent before dropping
    /// the orphan (§5).
    pub orphan_parent_timeout_secs: u64,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/7777".into(),
            bootstrap_peers: Vec::new(),
            protocol_version: "/helix/1.0.0".into(),
            gossip_topic: "helix-wire".into(),
            idle_peer_timeout_secs: IDLE_PEER_TIMEOUT_SECS,
            dead_peer_timeout_secs: DEAD_PEER_TIMEOUT_SECS,
            orphan_parent_timeout_secs: ORPHAN_PARENT_TIMEOUT_SECS,
        }
    }
}
