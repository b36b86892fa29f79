//! End-to-end smoke test for helix-node.
//!
//! Starts a real node process against a freshly generated genesis, submits
//! a signed transfer over JSON-RPC, and asserts the resulting balances once
//! PBFT has finalised a period containing it.
//!
//! Run with:
//!   cargo test -p helix-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use helix_core::transaction::{Recipient, Transaction, TransactionBody};
use helix_core::types::{Address, Balance, TxHash};
use helix_crypto::SigningKeyPair;
use helix_genesis::{GenesisAllocation, GenesisParams};

// ── Node lifecycle ───────────────────────────────────────────────────────────

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn hex0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ── RPC helpers ──────────────────────────────────────────────────────────────

async fn rpc_call(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "helix_getGenesisInfo",
        "params": [],
        "id": 1
    });
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

async fn get_balance(client: &reqwest::Client, url: &str, address: Address) -> Balance {
    let result = rpc_call(
        client,
        url,
        "helix_getBalance",
        serde_json::json!([hex0x(address.as_slice())]),
    )
    .await;
    result.as_str().unwrap().parse().expect("parse balance")
}

async fn get_nonce(client: &reqwest::Client, url: &str, address: Address) -> u64 {
    let result = rpc_call(
        client,
        url,
        "helix_getAccount",
        serde_json::json!([hex0x(address.as_slice())]),
    )
    .await;
    result["nonce"].as_u64().expect("nonce field")
}

async fn send_tx(client: &reqwest::Client, url: &str, tx: &Transaction) -> TxHash {
    let encoded = alloy_rlp::encode(tx);
    let result = rpc_call(
        client,
        url,
        "helix_sendTransaction",
        serde_json::json!([hex0x(&encoded)]),
    )
    .await;
    TxHash::from_hex(result.as_str().expect("tx hash string")).expect("valid tx hash")
}

/// Poll a balance until it reaches `expected` or the timeout elapses.
async fn wait_for_balance(
    client: &reqwest::Client,
    url: &str,
    address: Address,
    expected: Balance,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if get_balance(client, url, address).await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
    }
    false
}

// ── Transaction builder ──────────────────────────────────────────────────────

fn build_transfer(
    key: &SigningKeyPair,
    nonce: u64,
    to: Address,
    value: Balance,
    gas_price: Balance,
) -> Transaction {
    let body = TransactionBody {
        nonce,
        gas_price,
        gas_limit: 21_000,
        to: Recipient::Call(to),
        value,
        data: Vec::new(),
    };
    let digest = body.signing_digest();
    let signature = key.sign(&digest).expect("sign transfer");
    let mut tx = Transaction {
        body,
        signature,
        hash: TxHash::from_bytes([0u8; 32]),
        sender: key.address,
    };
    tx.hash = tx.compute_hash();
    tx
}

fn spawn_node(data_dir: &PathBuf, rpc_port: u16, p2p_port: u16, genesis_path: &PathBuf) -> Child {
    let node_bin = env!("CARGO_BIN_EXE_helix-node");
    Command::new(node_bin)
        .args([
            "--data-dir",
            data_dir.join("state").to_str().unwrap(),
            "--rpc-addr",
            &format!("127.0.0.1:{rpc_port}"),
            "--p2p-listen",
            &format!("/ip4/127.0.0.1/tcp/{p2p_port}"),
            "--genesis-params",
            genesis_path.to_str().unwrap(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn helix-node")
}

// ── Smoke test ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn smoke_genesis_balance_and_transfer() {
    let data_dir = std::env::temp_dir().join(format!("helix_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let funded = SigningKeyPair::generate();
    let funded_balance = Balance::from(100_000_000u64);

    let genesis_params = GenesisParams {
        allocations: vec![GenesisAllocation {
            address: hex0x(funded.address.as_slice()),
            balance: funded_balance.to_string(),
        }],
        ..GenesisParams::default()
    };
    let genesis_path = data_dir.join("genesis.json");
    std::fs::write(
        &genesis_path,
        serde_json::to_string_pretty(&genesis_params).unwrap(),
    )
    .unwrap();

    let rpc_port = free_port();
    let p2p_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");

    let child = spawn_node(&data_dir, rpc_port, p2p_port, &genesis_path);
    let _guard = NodeGuard { child, data_dir };

    let http = reqwest::Client::new();
    assert!(
        wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await,
        "helix-node did not become ready within 20 seconds"
    );

    // Genesis allocation is visible immediately, before any period beyond 0
    // is finalised.
    let genesis_bal = get_balance(&http, &rpc_url, funded.address).await;
    assert_eq!(genesis_bal, funded_balance, "genesis balance mismatch");

    // Transfer from the funded account to a fresh recipient.
    let recipient = SigningKeyPair::generate().address;
    let nonce = get_nonce(&http, &rpc_url, funded.address).await;
    let value = Balance::from(1_000u64);
    let gas_price = Balance::from(1u64);
    let tx = build_transfer(&funded, nonce, recipient, value, gas_price);
    send_tx(&http, &rpc_url, &tx).await;

    // The node is its own sole validator here, so it finalises every period
    // on its own; still needs at least one full PBFT round plus a block
    // tick to pick the transaction up.
    assert!(
        wait_for_balance(&http, &rpc_url, recipient, value, Duration::from_secs(30)).await,
        "recipient never received the transfer"
    );

    let gas_cost = gas_price * Balance::from(21_000u64);
    let expected_sender_balance = funded_balance - value - gas_cost;
    let sender_bal_after = get_balance(&http, &rpc_url, funded.address).await;
    assert_eq!(
        sender_bal_after, expected_sender_balance,
        "sender balance should be reduced by the transfer value and gas cost"
    );

    let receipt = rpc_call(
        &http,
        &rpc_url,
        "helix_getTransactionReceipt",
        serde_json::json!([tx.hash.to_hex()]),
    )
    .await;
    assert_eq!(receipt["status"].as_u64(), Some(1), "transfer should have succeeded");
}
