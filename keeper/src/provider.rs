use async_trait::async_trait;
use ethers::providers::{JsonRpcError, ProviderError, RpcError as _};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256};

pub use http::EthersKeeperProvider;
pub use trace::{CallFrame, TraceOptions};

use crate::error::IsRetryable;

mod http;
mod trace;


/// JSON-RPC error code nodes use for "invalid input", including traces of
/// transactions they have not indexed yet.
const INVALID_INPUT_CODE: i64 = -32000;

/// Chain access needed by the keeper: simulation, signing, broadcasting,
/// receipts, traces and contract reads.
#[async_trait]
pub trait KeeperProvider: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Address transactions are signed with.
    fn address(&self) -> Address;

    /// `eth_call` against the latest block, used to simulate and to read contracts.
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError>;

    /// Pending transaction count of `address`.
    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError>;

    /// Signs `tx` and returns the raw RLP encoded transaction.
    async fn sign(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError>;

    async fn transaction_receipt(&self, hash: H256)
        -> Result<Option<TransactionReceipt>, RpcError>;

    /// `debug_traceTransaction` with the call tracer.
    async fn trace_transaction(&self, hash: H256) -> Result<CallFrame, RpcError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("execution reverted: {message}")]
    Reverted {
        data: Option<Bytes>,
        message: String,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Transport(String),
}

impl RpcError {
    pub fn from_json_rpc(response: &JsonRpcError) -> Self {
        if let Some(data) = response.as_revert_data() {
            return RpcError::Reverted {
                data: (!data.is_empty()).then_some(data),
                message: response.message.clone(),
            };
        }
        if response.code == INVALID_INPUT_CODE {
            return RpcError::InvalidInput(response.message.clone());
        }
        RpcError::Transport(format!("{} ({})", response.message, response.code))
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, RpcError::InvalidInput(_))
    }
}

impl From<ProviderError> for RpcError {
    fn from(err: ProviderError) -> Self {
        match err.as_error_response() {
            Some(response) => RpcError::from_json_rpc(response),
            None => RpcError::Transport(err.to_string()),
        }
    }
}

impl IsRetryable for RpcError {
    fn is_retryable(&self) -> bool {
        !matches!(self, RpcError::Reverted { .. })
    }
}
