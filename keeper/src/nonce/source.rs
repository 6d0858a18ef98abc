use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use derive_new::new;
use ethers::types::Address;

use crate::provider::KeeperProvider;

use super::NonceError;

/// Identifies the nonce sequence of a signer on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, new)]
pub struct NonceKey {
    pub address: Address,
    pub chain_id: u64,
}

impl fmt::Display for NonceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}.{}", self.address, self.chain_id)
    }
}

/// Authoritative source of nonces the manager reconciles against.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn get(&self, key: &NonceKey) -> Result<u64, NonceError>;

    /// Called with every nonce handed out by the manager.
    async fn set(&self, _key: &NonceKey, _nonce: u64) -> Result<(), NonceError> {
        Ok(())
    }
}

/// Reads the pending transaction count of the signer from the RPC provider.
#[derive(new)]
pub struct ProviderNonceSource {
    provider: Arc<dyn KeeperProvider>,
}

#[async_trait]
impl NonceSource for ProviderNonceSource {
    async fn get(&self, key: &NonceKey) -> Result<u64, NonceError> {
        self.provider
            .transaction_count(key.address)
            .await
            .map_err(|err| NonceError::Fetch {
                key: key.to_string(),
                message: err.to_string(),
            })
    }
}
