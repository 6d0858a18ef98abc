use ethers::types::H256;

use crate::keeper::{Fingerprint, Revert};
use crate::nonce::NonceError;
use crate::provider::RpcError;
use crate::scheduler::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    #[error("Failed to encode call to {function}: {reason}")]
    Encoding { function: String, reason: String },
    #[error("Simulation reverted: {0}")]
    SimulationRevert(Revert),
    #[error("Simulation failed: {0}")]
    Simulation(RpcError),
    #[error(transparent)]
    Nonce(#[from] NonceError),
    #[error("Failed to sign transaction: {0}")]
    SignTransport(RpcError),
    #[error("Failed to broadcast transaction {hash:?}: {source}")]
    Broadcast {
        hash: H256,
        #[source]
        source: RpcError,
    },
    #[error("Timed out while waiting for transaction {hash:?} with nonce {nonce}")]
    ReceiptTimeout { hash: H256, nonce: u64 },
    #[error("Execution reverted: {0}")]
    ExecutionReverted(Revert),
    #[error("no trace for transaction {0:?}")]
    TraceUnavailable(H256),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Malformed message: {0}")]
    Malformed(String),
    #[error("{0}")]
    EyreError(#[from] eyre::Report),
}

impl KeeperError {
    /// The decoded revert, when the failure came from contract execution.
    pub fn revert(&self) -> Option<&Revert> {
        match self {
            KeeperError::SimulationRevert(revert) | KeeperError::ExecutionReverted(revert) => {
                Some(revert)
            }
            _ => None,
        }
    }

    /// Human readable reason, `Name(arg,...)` for decoded reverts and the
    /// error message otherwise. Ignore policies match against this string.
    pub fn reason(&self) -> String {
        match self.revert() {
            Some(revert) => revert.reason(),
            None => self.to_string(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        match self.revert() {
            Some(revert) => revert.fingerprint(),
            None => Fingerprint::new(
                self.to_metrics_label().to_owned(),
                self.to_metrics_label().to_owned(),
                None,
            ),
        }
    }

    /// Whether the target contract rejected the call, either while simulating
    /// or on chain.
    pub fn is_contract_execution(&self) -> bool {
        matches!(
            self,
            KeeperError::SimulationRevert(_) | KeeperError::ExecutionReverted(_)
        )
    }

    /// Name of the decoded revert, if any.
    pub fn revert_name(&self) -> Option<&str> {
        self.revert().map(|revert| revert.name.as_str())
    }

    pub fn to_metrics_label(&self) -> &'static str {
        match self {
            KeeperError::Encoding { .. } => "Encoding",
            KeeperError::SimulationRevert(_) => "SimulationRevert",
            KeeperError::Simulation(_) => "Simulation",
            KeeperError::Nonce(_) => "Nonce",
            KeeperError::SignTransport(_) => "SignTransport",
            KeeperError::Broadcast { .. } => "Broadcast",
            KeeperError::ReceiptTimeout { .. } => "ReceiptTimeout",
            KeeperError::ExecutionReverted(_) => "ExecutionReverted",
            KeeperError::TraceUnavailable(_) => "TraceUnavailable",
            KeeperError::Rpc(_) => "Rpc",
            KeeperError::Store(_) => "Store",
            KeeperError::Malformed(_) => "Malformed",
            KeeperError::EyreError(_) => "EyreError",
        }
    }
}

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for KeeperError {
    fn is_retryable(&self) -> bool {
        match self {
            KeeperError::Simulation(err)
            | KeeperError::SignTransport(err)
            | KeeperError::Broadcast { source: err, .. }
            | KeeperError::Rpc(err) => err.is_retryable(),
            KeeperError::ReceiptTimeout { .. }
            | KeeperError::TraceUnavailable(_)
            | KeeperError::Nonce(_)
            | KeeperError::Store(_)
            | KeeperError::EyreError(_) => true,
            KeeperError::Encoding { .. }
            | KeeperError::SimulationRevert(_)
            | KeeperError::ExecutionReverted(_)
            | KeeperError::Malformed(_) => false,
        }
    }
}
