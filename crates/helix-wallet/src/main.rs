use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use helix_core::transaction::{Recipient, Transaction, TransactionBody};
use helix_core::types::{Balance, TxHash};
use helix_crypto::SigningKeyPair;
use helix_rpc::HelixApiClient;
use jsonrpsee::http_client::HttpClientBuilder;

const DEFAULT_KEYFILE: &str = "~/.helix/wallet.json";
const DEFAULT_RPC: &str = "http://127.0.0.1:8545";

#[derive(Parser)]
#[command(name = "helix-wallet", about = "Command-line wallet for a Helix node")]
struct Args {
    /// Path to the keyfile holding this wallet's signing key.
    #[arg(long, global = true, default_value = DEFAULT_KEYFILE)]
    keyfile: String,

    /// Base URL of the node's JSON-RPC endpoint.
    #[arg(long, global = true, default_value = DEFAULT_RPC)]
    rpc: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new keypair and write it to the keyfile.
    Keygen,
    /// Print an account's balance (defaults to this wallet's own account).
    Balance { account: Option<String> },
    /// Print an account's full state (defaults to this wallet's own account).
    Account { account: Option<String> },
    /// Sign and submit a value transfer.
    Transfer {
        to: String,
        amount: String,
        #[arg(long)]
        gas_price: Option<String>,
        #[arg(long)]
        gas_limit: Option<u64>,
        /// Calldata as hex. Written verbatim; see `helix_getStorageAt` for how
        /// a code-bearing recipient turns this into storage writes.
        #[arg(long)]
        data: Option<String>,
    },
    /// Submit a transaction that was already signed and RLP-encoded elsewhere.
    SubmitRaw { tx_hex: String },
    /// Print node and protocol version information.
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let keyfile = expand_tilde(&args.keyfile);

    match args.command {
        Command::Keygen => cmd_keygen(&keyfile),
        Command::Balance { account } => cmd_balance(&args.rpc, &keyfile, account).await,
        Command::Account { account } => cmd_account(&args.rpc, &keyfile, account).await,
        Command::Transfer {
            to,
            amount,
            gas_price,
            gas_limit,
            data,
        } => cmd_transfer(&args.rpc, &keyfile, to, amount, gas_price, gas_limit, data).await,
        Command::SubmitRaw { tx_hex } => cmd_submit_raw(&args.rpc, tx_hex).await,
        Command::Info => cmd_info(&args.rpc).await,
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

fn hex0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn parse_address(s: &str) -> Result<Address> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).context("invalid address hex")?;
    if bytes.len() != 20 {
        bail!("address must be 20 bytes, got {}", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

fn cmd_keygen(keyfile: &Path) -> Result<()> {
    if keyfile.exists() {
        bail!(
            "keyfile already exists at {}; refusing to overwrite",
            keyfile.display()
        );
    }
    if let Some(parent) = keyfile.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let kp = SigningKeyPair::generate();
    let json = serde_json::to_string_pretty(&kp)?;
    std::fs::write(keyfile, json)
        .with_context(|| format!("writing keyfile {}", keyfile.display()))?;

    println!("account:  {}", hex0x(kp.address.as_slice()));
    println!("keyfile:  {}", keyfile.display());
    println!("BACK UP YOUR KEYFILE — it is the only copy of your private key.");
    Ok(())
}

fn load_keypair(keyfile: &Path) -> Result<SigningKeyPair> {
    let data = std::fs::read_to_string(keyfile).with_context(|| {
        format!(
            "reading keyfile {} (run `helix-wallet keygen` first)",
            keyfile.display()
        )
    })?;
    let kp: SigningKeyPair = serde_json::from_str(&data)
        .with_context(|| format!("parsing keyfile {}", keyfile.display()))?;
    Ok(kp)
}

fn resolve_account(account: Option<String>, keyfile: &Path) -> Result<Address> {
    match account {
        Some(a) => parse_address(&a),
        None => Ok(load_keypair(keyfile)?.address),
    }
}

async fn cmd_balance(rpc: &str, keyfile: &Path, account: Option<String>) -> Result<()> {
    let address = resolve_account(account, keyfile)?;
    let client = HttpClientBuilder::default().build(rpc)?;
    let balance = client.get_balance(hex0x(address.as_slice())).await?;
    println!("{balance}");
    Ok(())
}

async fn cmd_account(rpc: &str, keyfile: &Path, account: Option<String>) -> Result<()> {
    let address = resolve_account(account, keyfile)?;
    let client = HttpClientBuilder::default().build(rpc)?;
    let account = client.get_account(hex0x(address.as_slice())).await?;
    println!("address:       {}", account.address);
    println!("nonce:         {}", account.nonce);
    println!("balance:       {}", account.balance);
    println!("code_hash:     {}", account.code_hash);
    println!("code_size:     {}", account.code_size);
    println!("storage_root:  {}", account.storage_root);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_transfer(
    rpc: &str,
    keyfile: &Path,
    to: String,
    amount: String,
    gas_price: Option<String>,
    gas_limit: Option<u64>,
    data: Option<String>,
) -> Result<()> {
    let kp = load_keypair(keyfile)?;
    let client = HttpClientBuilder::default().build(rpc)?;

    let to_addr = parse_address(&to)?;
    let value: Balance = amount.parse().context("invalid amount")?;
    let gas_price: Balance = match gas_price {
        Some(g) => g.parse().context("invalid gas price")?,
        None => Balance::from(1u64),
    };
    let data = match data {
        Some(d) => {
            hex::decode(d.strip_prefix("0x").unwrap_or(&d)).context("invalid data hex")?
        }
        None => Vec::new(),
    };

    let account = client.get_account(hex0x(kp.address.as_slice())).await?;

    let body = TransactionBody {
        nonce: account.nonce,
        gas_price,
        gas_limit: gas_limit.unwrap_or(21_000),
        to: Recipient::Call(to_addr),
        value,
        data,
    };
    let digest = body.signing_digest();
    let signature = kp.sign(&digest)?;
    let mut tx = Transaction {
        body,
        signature,
        hash: TxHash::from_bytes([0u8; 32]),
        sender: kp.address,
    };
    tx.hash = tx.compute_hash();

    let encoded = alloy_rlp::encode(&tx);
    let sent_hash = client.send_transaction(hex0x(&encoded)).await?;
    println!("submitted {sent_hash}");
    Ok(())
}

async fn cmd_submit_raw(rpc: &str, tx_hex: String) -> Result<()> {
    let client = HttpClientBuilder::default().build(rpc)?;
    let sent_hash = client.send_transaction(tx_hex).await?;
    println!("submitted {sent_hash}");
    Ok(())
}

async fn cmd_info(rpc: &str) -> Result<()> {
    let client = HttpClientBuilder::default().build(rpc)?;
    let version = client.get_version().await?;
    let genesis = client.get_genesis_info().await?;
    println!("node_version:      {}", version.node_version);
    println!("protocol_version:  {}", version.protocol_version);
    println!("chain_id:          {}", genesis.chain_id);
    println!("genesis_hash:      {}", genesis.genesis_hash);
    println!("gas_limit:         {}", genesis.gas_limit);
    Ok(())
}
