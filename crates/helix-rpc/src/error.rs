use jsonrpsee::types::ErrorObject;

use helix_core::HelixError;
use helix_state::StoreError;

/// Maps internal errors onto JSON-RPC error codes.
///
/// Per the error-handling contract (§7): transaction-submission errors and
/// call/simulation errors are surfaced with a specific code and message;
/// everything else (a store failure, a malformed-internally-but-not-user's-
/// fault condition) collapses to a generic internal server error rather than
/// leaking internal detail to a client.
pub const INVALID_PARAMS: i32 = -32602;
pub const TX_REJECTED: i32 = -32000;
pub const INTERNAL_ERROR: i32 = -32603;

pub fn invalid_params(msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(INVALID_PARAMS, msg.into(), None::<()>)
}

pub fn tx_rejected(msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(TX_REJECTED, msg.into(), None::<()>)
}

pub fn internal(msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(INTERNAL_ERROR, msg.into(), None::<()>)
}

pub fn store_err(e: StoreError) -> ErrorObject<'static> {
    internal(e.to_string())
}

pub fn helix_err(e: HelixError) -> ErrorObject<'static> {
    tx_rejected(e.to_string())
}
