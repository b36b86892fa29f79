use alloy_primitives::B256;
use alloy_rlp::Encodable;
use helix_core::receipt::{Log, Receipt};
use helix_core::transaction::{Recipient, Transaction};
use helix_core::types::{Address, Balance, OptionalAddress};

use crate::error::StoreError;
use crate::store::{Store, WriteBatch};

/// Size of one declarative storage write: a 32-byte slot followed by its
/// 32-byte value.
const STORAGE_WRITE_BYTES: usize = 64;

const BASE_GAS_CALL: u64 = 21_000;
const BASE_GAS_CREATE: u64 = 53_000;

/// The state-transition collaborator the finaliser drives one transaction at
/// a time, in DAG order, within a single period's write batch.
///
/// Implementations own all execution semantics; the finaliser only owns
/// sequencing, receipt accounting, and the log-bloom index. A panic inside
/// an implementation is the caller's responsibility to catch and convert to
/// `HelixError::ExecutorPanic` — this crate's own implementation below never
/// panics on attacker-controlled input.
pub trait StateExecutor {
    /// Apply `tx`, staging every resulting account/code write into `batch`.
    /// `cumulative_gas_used` is the running total for the enclosing block
    /// *before* this transaction, so the returned receipt's
    /// `cumulative_gas_used` only needs `cumulative_gas_used + gas_used`.
    fn execute(
        &self,
        store: &Store,
        batch: &mut WriteBatch,
        tx: &Transaction,
        cumulative_gas_used: u64,
    ) -> Result<Receipt, StoreError>;
}

/// A minimal EVM-flavoured executor: value transfer, contract "deployment",
/// and declarative storage writes against the account-keyed store, with no
/// bytecode interpreter or gas metering beyond a flat per-kind base cost —
/// opcode interpretation is explicitly out of scope. A call into an account
/// that carries code treats its `data` as a sequence of 64-byte
/// `(slot, value)` pairs to write directly into that account's storage,
/// rather than bytecode to run; this gives `account storage` a genuine
/// read/write path (the store's `storage`/`stage_storage`, §4.1's
/// `state_acc_trie_*`) without simulating opcodes. `storage_root` is a hash
/// chain over applied writes (`keccak256(old_root ++ slot ++ value)`),
/// matching the non-trie simplification already used for transaction and
/// receipt roots elsewhere in this crate.
pub struct SimpleStateExecutor;

impl StateExecutor for SimpleStateExecutor {
    fn execute(
        &self,
        store: &Store,
        batch: &mut WriteBatch,
        tx: &Transaction,
        cumulative_gas_used: u64,
    ) -> Result<Receipt, StoreError> {
        let base_gas = match tx.body.to {
            Recipient::Call(_) => BASE_GAS_CALL,
            Recipient::Create => BASE_GAS_CREATE,
        };

        if tx.gas_limit() < base_gas {
            return Ok(failed_receipt(cumulative_gas_used));
        }

        let mut sender = store.account(tx.sender)?;
        let gas_cost = tx.body.gas_price * Balance::from(base_gas);
        let Some(total_cost) = gas_cost.checked_add(tx.body.value) else {
            return Ok(failed_receipt(cumulative_gas_used));
        };

        if sender.balance < total_cost {
            return Ok(failed_receipt(cumulative_gas_used));
        }

        sender.balance -= total_cost;
        sender.nonce += 1;

        let (contract_address, mut logs) = match tx.body.to {
            Recipient::Call(to) => {
                let mut to_account = store.account(to)?;
                to_account.balance += tx.body.value;
                let logs = apply_storage_writes(store, batch, to, &mut to_account, &tx.body.data)?;
                store.stage_account(batch, to, &to_account)?;
                (OptionalAddress::none(), logs)
            }
            Recipient::Create => {
                let address = derive_create_address(tx.sender, tx.nonce());
                deploy(store, batch, address, &tx.body.data, tx.body.value)?;
                (OptionalAddress::some(address), vec![deployment_log(address)])
            }
        };

        store.stage_account(batch, tx.sender, &sender)?;
        logs.shrink_to_fit();

        Ok(Receipt {
            status: 1,
            gas_used: base_gas,
            cumulative_gas_used: cumulative_gas_used + base_gas,
            logs,
            contract_address,
        })
    }
}

/// Applies `data` to `to_account`'s storage as a sequence of 64-byte
/// `(slot, value)` pairs, if `to_account` carries code and `data` is a
/// non-empty multiple of that size. Anything else (a plain value transfer's
/// empty data, calldata to a code-less account, a malformed length) is a
/// no-op — this executor has no way to interpret calldata as anything other
/// than these declarative writes, so it only acts when the convention is
/// unambiguous. Mutates `to_account.storage_root` in place; the caller
/// stages the account once, after both the balance credit and any storage
/// writes are folded in, so the two never clobber each other in the batch.
fn apply_storage_writes(
    store: &Store,
    batch: &mut WriteBatch,
    to: Address,
    to_account: &mut helix_core::account::Account,
    data: &[u8],
) -> Result<Vec<Log>, StoreError> {
    if to_account.code_size == 0 || data.is_empty() || data.len() % STORAGE_WRITE_BYTES != 0 {
        return Ok(Vec::new());
    }

    let mut logs = Vec::with_capacity(data.len() / STORAGE_WRITE_BYTES);
    for chunk in data.chunks_exact(STORAGE_WRITE_BYTES) {
        let slot = B256::from_slice(&chunk[..32]);
        let value = B256::from_slice(&chunk[32..]);

        store.stage_storage(batch, to, slot, value)?;

        let mut preimage = Vec::with_capacity(96);
        preimage.extend_from_slice(to_account.storage_root.as_slice());
        preimage.extend_from_slice(slot.as_slice());
        preimage.extend_from_slice(value.as_slice());
        to_account.storage_root = B256::from(helix_core::hash_bytes(&preimage));

        logs.push(Log {
            address: to,
            topics: vec![slot],
            data: value.as_slice().to_vec(),
        });
    }

    Ok(logs)
}

fn deploy(
    store: &Store,
    batch: &mut WriteBatch,
    address: Address,
    code: &[u8],
    value: Balance,
) -> Result<(), StoreError> {
    let mut account = store.account(address)?;
    account.balance += value;
    if !code.is_empty() {
        let code_hash = helix_core::hash_bytes(code);
        store.stage_code(batch, &code_hash, code)?;
        account.code_hash = alloy_primitives::B256::from(code_hash);
        account.code_size = code.len() as u64;
    }
    store.stage_account(batch, address, &account)
}

/// CREATE-scheme contract address: keccak256(rlp(sender, nonce))[12..],
/// matching the Ethereum convention so addresses stay recognisable to
/// anything reading the chain as an EVM-compatible one.
fn derive_create_address(sender: Address, nonce: u64) -> Address {
    let mut buf = Vec::new();
    let header = alloy_rlp::Header {
        list: true,
        payload_length: sender.length() + nonce.length(),
    };
    header.encode(&mut buf);
    alloy_rlp::Encodable::encode(&sender, &mut buf);
    alloy_rlp::Encodable::encode(&nonce, &mut buf);
    let digest = helix_core::hash_bytes(&buf);
    Address::from_slice(&digest[12..])
}

fn deployment_log(contract: Address) -> Log {
    Log {
        address: contract,
        topics: vec![],
        data: Vec::new(),
    }
}

fn failed_receipt(cumulative_gas_used: u64) -> Receipt {
    Receipt {
        status: 0,
        gas_used: 0,
        cumulative_gas_used,
        logs: vec![],
        contract_address: OptionalAddress::none(),
    }
}
