use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use alloy_primitives::{Address as EvmAddress, B256};
use helix_core::constants::CHAIN_ID;
use helix_core::header::FinalHeader;
use helix_core::receipt::Receipt;
use helix_core::transaction::Transaction;
use helix_core::types::{Address, Bloom, BlockHash, Period, TxHash};
use helix_consensus::ValidatorSet;
use helix_state::{periods_matching_bloom, PeriodData, Store};

use crate::api::HelixApiServer;
use crate::cache::{MapByBlockCache, ValueByBlockCache};
use crate::error::{internal, invalid_params, tx_rejected};
use crate::types::{
    RpcAccount, RpcEligibility, RpcGenesisInfo, RpcHeader, RpcLog, RpcLogEntry, RpcLogFilter,
    RpcNetworkInfo, RpcReceipt, RpcStorageValue, RpcTransaction, RpcVersionInfo,
};

/// Number of trailing periods the query-facade caches keep warm. Chosen to
/// comfortably cover the "near head" query pattern (§4.8) without holding
/// unbounded history — well past `REPLAY_PROTECTION_WINDOW` so a client
/// re-polling recent periods during normal operation stays hot.
const CACHE_CAPACITY: usize = 256;

/// Shared state passed to the RPC server.
///
/// `store` is cheap to clone (an `Arc<sled::Db>` handle), so this struct
/// holds it directly rather than behind another `Arc` layer; `validators`
/// is the active epoch's set, refreshed by the node between epochs.
pub struct RpcServerState {
    pub store: Store,
    pub validators: ValidatorSet,
    /// Sender to forward incoming transactions to the node's pool; `None`
    /// in a read-only / query-facade-only deployment.
    pub tx_sender: Option<tokio::sync::mpsc::Sender<Transaction>>,
    /// This node's full libp2p multiaddress (including `/p2p/<peer id>`),
    /// for `helix_getNetworkInfo`; `None` before the P2P network has
    /// finished starting.
    pub peer_multiaddr: Option<String>,
    header_cache: ValueByBlockCache<FinalHeader>,
    period_data_cache: ValueByBlockCache<PeriodData>,
    receipt_cache: MapByBlockCache<TxHash, Receipt>,
}

impl RpcServerState {
    pub fn new(
        store: Store,
        validators: ValidatorSet,
        tx_sender: Option<tokio::sync::mpsc::Sender<Transaction>>,
        peer_multiaddr: Option<String>,
    ) -> Self {
        Self {
            store,
            validators,
            tx_sender,
            peer_multiaddr,
            header_cache: ValueByBlockCache::new(CACHE_CAPACITY),
            period_data_cache: ValueByBlockCache::new(CACHE_CAPACITY),
            receipt_cache: MapByBlockCache::new(CACHE_CAPACITY),
        }
    }
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

// ── Hex helpers ──────────────────────────────────────────────────────────────
// None of the wire types here carry a `to_hex`/`from_hex` pair the RPC layer
// can reuse directly (addresses and B256 words are bare alloy types), so the
// 0x-prefixed convention is applied at this boundary only.

fn hex0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn parse_address(s: &str) -> RpcResult<Address> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| invalid_params(format!("invalid address: {e}")))?;
    if bytes.len() != 20 {
        return Err(invalid_params("address must be 20 bytes").into());
    }
    Ok(EvmAddress::from_slice(&bytes))
}

fn parse_b256(s: &str) -> RpcResult<B256> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| invalid_params(format!("invalid hash: {e}")))?;
    if bytes.len() != 32 {
        return Err(invalid_params("hash must be 32 bytes").into());
    }
    Ok(B256::from_slice(&bytes))
}

fn parse_tx_hash(s: &str) -> RpcResult<TxHash> {
    Ok(TxHash(parse_b256(s)?))
}

fn parse_block_hash(s: &str) -> RpcResult<BlockHash> {
    Ok(BlockHash(parse_b256(s)?))
}

fn header_to_rpc(header: &FinalHeader) -> RpcHeader {
    RpcHeader {
        period: header.period,
        hash: header.hash().to_hex(),
        parent_hash: header.parent_hash.to_hex(),
        author: hex0x(header.author.as_slice()),
        timestamp: header.timestamp,
        transactions_root: hex0x(header.transactions_root.as_slice()),
        receipts_root: hex0x(header.receipts_root.as_slice()),
        log_bloom: hex0x(&header.log_bloom.0),
        gas_used: header.gas_used,
        gas_limit: header.gas_limit,
    }
}

// ── RPC implementation ────────────────────────────────────────────────────────

#[async_trait]
impl HelixApiServer for RpcServer {
    async fn get_latest_period(&self) -> RpcResult<u64> {
        self.state.store.latest_period().map_err(|e| internal(e.to_string()).into())
    }

    async fn get_header_by_period(&self, period: u64) -> RpcResult<Option<RpcHeader>> {
        let latest = self.state.store.latest_period().map_err(|e| internal(e.to_string()))?;
        if period > latest {
            return Ok(None);
        }
        let store = &self.state.store;
        let header = self
            .state
            .header_cache
            .get_or_load(period, latest, || {
                store
                    .final_header(period)
                    .map_err(|e| internal(e.to_string()))?
                    .ok_or_else(|| internal("missing header for a finalised period"))
            })?;
        Ok(Some(header_to_rpc(&header)))
    }

    async fn get_header_by_hash(&self, hash: String) -> RpcResult<Option<RpcHeader>> {
        let hash = parse_block_hash(&hash)?;
        let period = self
            .state
            .store
            .period_by_hash(&hash)
            .map_err(|e| internal(e.to_string()))?;
        let Some(period) = period else { return Ok(None) };
        self.get_header_by_period(period).await
    }

    async fn get_period_by_hash(&self, hash: String) -> RpcResult<Option<u64>> {
        let hash = parse_block_hash(&hash)?;
        self.state
            .store
            .period_by_hash(&hash)
            .map_err(|e| internal(e.to_string()).into())
    }

    async fn get_account(&self, address: String) -> RpcResult<RpcAccount> {
        let address = parse_address(&address)?;
        let account = self
            .state
            .store
            .account(address)
            .map_err(|e| internal(e.to_string()))?;
        Ok(RpcAccount {
            address: hex0x(address.as_slice()),
            nonce: account.nonce,
            balance: account.balance.to_string(),
            code_hash: hex0x(account.code_hash.as_slice()),
            code_size: account.code_size,
            storage_root: hex0x(account.storage_root.as_slice()),
        })
    }

    async fn get_balance(&self, address: String) -> RpcResult<String> {
        let address = parse_address(&address)?;
        let account = self
            .state
            .store
            .account(address)
            .map_err(|e| internal(e.to_string()))?;
        Ok(account.balance.to_string())
    }

    async fn get_code(&self, address: String) -> RpcResult<String> {
        let address = parse_address(&address)?;
        let account = self
            .state
            .store
            .account(address)
            .map_err(|e| internal(e.to_string()))?;
        if account.code_hash.is_zero() {
            return Ok(String::new());
        }
        let code_hash: [u8; 32] = account.code_hash.0;
        let code = self
            .state
            .store
            .code(&code_hash)
            .map_err(|e| internal(e.to_string()))?;
        Ok(hex0x(&code))
    }

    async fn get_storage_at(&self, address: String, slot: String) -> RpcResult<RpcStorageValue> {
        let address = parse_address(&address)?;
        let slot = parse_b256(&slot)?;
        let value = self
            .state
            .store
            .storage(address, slot)
            .map_err(|e| internal(e.to_string()))?;
        Ok(RpcStorageValue {
            value: hex0x(value.as_slice()),
        })
    }

    async fn get_transaction_by_hash(&self, hash: String) -> RpcResult<Option<RpcTransaction>> {
        let hash = parse_tx_hash(&hash)?;
        let tx = self
            .state
            .store
            .get_transaction(&hash)
            .map_err(|e| internal(e.to_string()))?;
        let Some(tx) = tx else { return Ok(None) };
        let period = self
            .state
            .store
            .tx_period(&hash)
            .map_err(|e| internal(e.to_string()))?;
        Ok(Some(RpcTransaction {
            hash: tx.hash.to_hex(),
            sender: hex0x(tx.sender.as_slice()),
            to: tx.body.to.address().map(|a| hex0x(a.as_slice())),
            nonce: tx.nonce(),
            gas_price: tx.body.gas_price.to_string(),
            gas_limit: tx.gas_limit(),
            value: tx.body.value.to_string(),
            data: hex0x(&tx.body.data),
            period,
        }))
    }

    async fn get_transaction_receipt(&self, hash: String) -> RpcResult<Option<RpcReceipt>> {
        let hash = parse_tx_hash(&hash)?;
        let Some(period) = self
            .state
            .store
            .tx_period(&hash)
            .map_err(|e| internal(e.to_string()))?
        else {
            return Ok(None);
        };
        let latest = self.state.store.latest_period().map_err(|e| internal(e.to_string()))?;
        let store = &self.state.store;
        let receipt = self.state.receipt_cache.get_or_load(period, &hash, latest, || {
            store
                .receipt(&hash)
                .map_err(|e| internal(e.to_string()))?
                .ok_or_else(|| internal("receipt present without a period mapping"))
        })?;
        Ok(Some(RpcReceipt {
            transaction_hash: hash.to_hex(),
            period,
            status: receipt.status,
            gas_used: receipt.gas_used,
            cumulative_gas_used: receipt.cumulative_gas_used,
            contract_address: receipt.created_contract().map(|a| hex0x(a.as_slice())),
            logs: receipt
                .logs
                .iter()
                .map(|log| RpcLog {
                    address: hex0x(log.address.as_slice()),
                    topics: log.topics.iter().map(|t| hex0x(t.as_slice())).collect(),
                    data: hex0x(&log.data),
                })
                .collect(),
        }))
    }

    async fn get_logs(&self, filter: RpcLogFilter) -> RpcResult<Vec<RpcLogEntry>> {
        if filter.from_period > filter.to_period {
            return Err(invalid_params("from_period must not exceed to_period").into());
        }

        let addresses = filter
            .addresses
            .iter()
            .map(|s| parse_address(s))
            .collect::<RpcResult<Vec<_>>>()?;
        let topics = filter
            .topics
            .iter()
            .map(|s| parse_b256(s))
            .collect::<RpcResult<Vec<_>>>()?;

        let candidates = self
            .candidate_periods(filter.from_period, filter.to_period, &addresses, &topics)
            .map_err(|e| internal(e.to_string()))?;

        let latest = self.state.store.latest_period().map_err(|e| internal(e.to_string()))?;
        let store = &self.state.store;

        let mut matches = Vec::new();
        for period in candidates {
            if period > latest {
                continue;
            }
            let data = self.state.period_data_cache.get_or_load(period, latest, || {
                store
                    .period_data(period)
                    .map_err(|e| internal(e.to_string()))?
                    .ok_or_else(|| internal("missing period data for a finalised period"))
            })?;
            for tx_hash in &data.transactions {
                let receipt =
                    self.state
                        .receipt_cache
                        .get_or_load(period, tx_hash, latest, || {
                            store
                                .receipt(tx_hash)
                                .map_err(|e| internal(e.to_string()))?
                                .ok_or_else(|| internal("missing receipt for a finalised transaction"))
                        })?;
                for log in &receipt.logs {
                    let address_ok = addresses.is_empty() || addresses.contains(&log.address);
                    let topic_ok =
                        topics.is_empty() || log.topics.iter().any(|t| topics.contains(t));
                    if address_ok && topic_ok {
                        matches.push(RpcLogEntry {
                            period,
                            transaction_hash: tx_hash.to_hex(),
                            address: hex0x(log.address.as_slice()),
                            topics: log.topics.iter().map(|t| hex0x(t.as_slice())).collect(),
                            data: hex0x(&log.data),
                        });
                    }
                }
            }
        }
        Ok(matches)
    }

    async fn get_eligible_vote_count(&self, _period: u64) -> RpcResult<u64> {
        Ok(self.state.validators.total_count() as u64)
    }

    async fn get_eligibility(&self, address: String, _period: u64) -> RpcResult<RpcEligibility> {
        let address = parse_address(&address)?;
        let info = self.state.validators.get(&address);
        Ok(RpcEligibility {
            address: hex0x(address.as_slice()),
            is_validator: info.is_some(),
            stake: info.map(|v| v.stake).unwrap_or(0),
        })
    }

    async fn send_transaction(&self, tx_hex: String) -> RpcResult<String> {
        let stripped = tx_hex.strip_prefix("0x").unwrap_or(&tx_hex);
        let bytes = hex::decode(stripped).map_err(|e| invalid_params(format!("invalid hex: {e}")))?;
        let tx: Transaction = alloy_rlp::Decodable::decode(&mut bytes.as_slice())
            .map_err(|e| invalid_params(format!("invalid transaction encoding: {e}")))?;

        let hash = tx.hash.to_hex();

        if let Some(sender) = &self.state.tx_sender {
            sender
                .send(tx)
                .await
                .map_err(|_| tx_rejected("transaction queue full"))?;
        } else {
            warn!("RPC: sendTransaction called but no tx pipeline configured");
            return Err(internal("node tx pipeline not connected").into());
        }

        Ok(hash)
    }

    async fn get_genesis_info(&self) -> RpcResult<RpcGenesisInfo> {
        let genesis_hash = self
            .state
            .store
            .final_header(0)
            .map_err(|e| internal(e.to_string()))?
            .map(|h| h.hash().to_hex())
            .unwrap_or_else(|| BlockHash::zero().to_hex());
        Ok(RpcGenesisInfo {
            chain_id: CHAIN_ID,
            genesis_hash,
            gas_limit: helix_core::constants::DEFAULT_GAS_LIMIT,
        })
    }

    async fn get_version(&self) -> RpcResult<RpcVersionInfo> {
        Ok(RpcVersionInfo {
            node_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: 1,
        })
    }

    async fn get_network_info(&self) -> RpcResult<RpcNetworkInfo> {
        Ok(RpcNetworkInfo {
            peer_multiaddr: self.state.peer_multiaddr.clone().unwrap_or_default(),
        })
    }
}

impl RpcServer {
    /// Narrows `[from, to]` using the bloom hierarchy per requested address
    /// and topic, intersecting the two restrictions when both are present
    /// (a period must clear both to contain a genuinely matching log). This
    /// never drops a period that could contain a match — `get_logs` always
    /// re-checks the actual receipts of every surviving candidate.
    fn candidate_periods(
        &self,
        from: Period,
        to: Period,
        addresses: &[Address],
        topics: &[B256],
    ) -> Result<Vec<Period>, helix_state::StoreError> {
        let store = &self.state.store;
        let mut candidates: Option<HashSet<Period>> = None;

        if !addresses.is_empty() {
            let mut hit: HashSet<Period> = HashSet::new();
            for address in addresses {
                let mut needle = Bloom::default();
                needle.accrue(address.as_slice());
                hit.extend(periods_matching_bloom(store, from, to, &needle)?);
            }
            candidates = Some(hit);
        }

        if !topics.is_empty() {
            let mut hit: HashSet<Period> = HashSet::new();
            for topic in topics {
                let mut needle = Bloom::default();
                needle.accrue(topic.as_slice());
                hit.extend(periods_matching_bloom(store, from, to, &needle)?);
            }
            candidates = Some(match candidates {
                Some(existing) => existing.intersection(&hit).copied().collect(),
                None => hit,
            });
        }

        let mut periods: Vec<Period> = match candidates {
            Some(set) => set.into_iter().collect(),
            None => (from..=to).collect(),
        };
        periods.sort_unstable();
        Ok(periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use helix_core::account::Account;
    use helix_core::block::{DagBlock, DagBlockBody};
    use helix_core::transaction::{Recipient, Transaction, TransactionBody};
    use helix_core::types::Balance;
    use helix_crypto::SigningKeyPair;
    use helix_dag::{DagManager, Pool};
    use helix_state::{Finaliser, SimpleStateExecutor, WriteBatch};

    fn temp_store() -> Store {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let mut p = std::env::temp_dir();
        p.push(format!(
            "helix-rpc-server-test-{}",
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        Store::open(p).unwrap()
    }

    fn signed_tx(key: &SigningKeyPair, to: Address, value: Balance, nonce: u64) -> Transaction {
        let body = TransactionBody {
            nonce,
            gas_price: Balance::from(1u64),
            gas_limit: 21_000,
            to: Recipient::Call(to),
            value,
            data: vec![],
        };
        let digest = body.signing_digest();
        let signature = key.sign(&digest).unwrap();
        let mut tx = Transaction {
            body,
            signature,
            hash: TxHash::from_bytes([0u8; 32]),
            sender: key.address,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    fn signed_block(key: &SigningKeyPair, pivot: BlockHash, level: u64, txs: Vec<TxHash>) -> DagBlock {
        let body = DagBlockBody {
            pivot,
            tips: vec![],
            transactions: txs,
            level,
            timestamp: 0,
        };
        let digest = body.signing_digest();
        let signature = key.sign(&digest).unwrap();
        let mut block = DagBlock {
            body,
            signature,
            hash: BlockHash::zero(),
            sender: key.address,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Builds a store with one finalised period moving `2_000` from a funded
    /// sender to `recipient`, and an `RpcServer` wired against it.
    fn fixture() -> (RpcServer, Address, Address, TxHash) {
        let store = temp_store();
        let sender_key = SigningKeyPair::generate();
        let block_key = SigningKeyPair::generate();
        let recipient = Address::repeat_byte(0x77);

        let mut batch = WriteBatch::new();
        store
            .stage_account(&mut batch, sender_key.address, &Account::new(Balance::from(50_000u64)))
            .unwrap();
        store.commit(batch).unwrap();

        let tx = signed_tx(&sender_key, recipient, Balance::from(2_000u64), 0);
        let tx_hash = tx.hash;

        let mut dag = DagManager::new(BlockHash::zero());
        let mut pool = Pool::new(30_000_000);
        pool.submit_transaction(tx, |_, _| false).unwrap();

        let genesis = signed_block(&block_key, BlockHash::zero(), 0, vec![tx_hash]);
        let anchor = genesis.hash;
        dag.insert(genesis).unwrap();

        let finaliser = Finaliser::new(store, SimpleStateExecutor);
        finaliser
            .finalize_period(&mut dag, &mut pool, anchor, 1, block_key.address, 0, vec![])
            .unwrap();

        let state = Arc::new(RpcServerState::new(
            finaliser.store().clone(),
            ValidatorSet::new(),
            None,
            None,
        ));
        (RpcServer::new(state), sender_key.address, recipient, tx_hash)
    }

    #[tokio::test]
    async fn get_account_reflects_the_finalised_balance() {
        let (server, _sender, recipient, _tx) = fixture();
        let account = server.get_account(hex0x(recipient.as_slice())).await.unwrap();
        assert_eq!(account.balance, Balance::from(2_000u64).to_string());
    }

    #[tokio::test]
    async fn get_header_by_period_and_by_hash_agree() {
        let (server, ..) = fixture();
        let by_period = server.get_header_by_period(1).await.unwrap().unwrap();
        let by_hash = server
            .get_header_by_hash(by_period.hash.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_period.hash, by_hash.hash);
        assert_eq!(by_period.period, 1);
    }

    #[tokio::test]
    async fn get_transaction_by_hash_and_receipt_round_trip() {
        let (server, sender, recipient, tx_hash) = fixture();
        let hash = tx_hash.to_hex();

        let tx = server.get_transaction_by_hash(hash.clone()).await.unwrap().unwrap();
        assert_eq!(tx.sender, hex0x(sender.as_slice()));
        assert_eq!(tx.to.as_deref(), Some(hex0x(recipient.as_slice())).as_deref());
        assert_eq!(tx.period, Some(1));

        let receipt = server.get_transaction_receipt(hash).await.unwrap().unwrap();
        assert_eq!(receipt.period, 1);
        assert_eq!(receipt.status, 1);
    }

    #[tokio::test]
    async fn get_logs_returns_empty_without_matching_events() {
        let (server, ..) = fixture();
        let logs = server
            .get_logs(RpcLogFilter {
                from_period: 1,
                to_period: 1,
                addresses: vec![hex0x(Address::repeat_byte(0x99).as_slice())],
                topics: vec![],
            })
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn get_eligibility_reports_non_validator_for_unknown_address() {
        let (server, sender, ..) = fixture();
        let eligibility = server
            .get_eligibility(hex0x(sender.as_slice()), 1)
            .await
            .unwrap();
        assert!(!eligibility.is_validator);
        assert_eq!(eligibility.stake, 0);
    }

    #[tokio::test]
    async fn send_transaction_without_a_pipeline_is_rejected() {
        let (server, _sender, recipient, _tx) = fixture();
        let tx = signed_tx(&SigningKeyPair::generate(), recipient, Balance::from(1u64), 0);
        let mut buf = Vec::new();
        alloy_rlp::Encodable::encode(&tx, &mut buf);
        let result = server.send_transaction(hex0x(&buf)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_network_info_reports_empty_before_p2p_starts() {
        let (server, ..) = fixture();
        let info = server.get_network_info().await.unwrap();
        assert_eq!(info.peer_multiaddr, "");
    }

    #[tokio::test]
    async fn get_storage_at_an_untouched_slot_is_the_zero_word() {
        let (server, _sender, recipient, _tx) = fixture();
        let value = server
            .get_storage_at(hex0x(recipient.as_slice()), hex0x(&[0u8; 32]))
            .await
            .unwrap();
        assert_eq!(value.value, hex0x(&[0u8; 32]));
    }

    #[tokio::test]
    async fn get_storage_at_reads_back_a_written_slot() {
        let (server, _sender, recipient, _tx) = fixture();
        let slot = [0x11u8; 32];
        let value_bytes = [0x22u8; 32];

        let mut batch = WriteBatch::new();
        server
            .state
            .store
            .stage_storage(&mut batch, recipient, B256::from(slot), B256::from(value_bytes))
            .unwrap();
        server.state.store.commit(batch).unwrap();

        let value = server
            .get_storage_at(hex0x(recipient.as_slice()), hex0x(&slot))
            .await
            .unwrap();
        assert_eq!(value.value, hex0x(&value_bytes));
    }
}
