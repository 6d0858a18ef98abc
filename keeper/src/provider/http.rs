use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{
    Http, HttpRateLimitRetryPolicy, Middleware, Provider, RetryClient, RetryClientBuilder,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionReceipt, H256};
use tracing::instrument;
use url::Url;

use super::{CallFrame, KeeperProvider, RpcError, TraceOptions};

const RATE_LIMIT_RETRIES: u32 = 10;
const TIMEOUT_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// [`KeeperProvider`] over an `ethers` HTTP provider with retries on rate
/// limits and timeouts, signing with any `ethers` signer.
pub struct EthersKeeperProvider<S> {
    provider: Provider<RetryClient<Http>>,
    signer: S,
    chain_id: u64,
}

impl<S> fmt::Debug for EthersKeeperProvider<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthersKeeperProvider")
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl EthersKeeperProvider<LocalWallet> {
    pub fn with_private_key(url: Url, private_key: &str, chain_id: u64) -> eyre::Result<Self> {
        let wallet = private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()?
            .with_chain_id(chain_id);
        Ok(Self::new(url, wallet, chain_id))
    }
}

impl<S: Signer> EthersKeeperProvider<S> {
    pub fn new(url: Url, signer: S, chain_id: u64) -> Self {
        let client = RetryClientBuilder::default()
            .rate_limit_retries(RATE_LIMIT_RETRIES)
            .timeout_retries(TIMEOUT_RETRIES)
            .initial_backoff(INITIAL_BACKOFF)
            .build(Http::new(url), Box::<HttpRateLimitRetryPolicy>::default());
        Self {
            provider: Provider::new(client),
            signer,
            chain_id,
        }
    }
}

#[async_trait]
impl<S> KeeperProvider for EthersKeeperProvider<S>
where
    S: Signer + 'static,
{
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn address(&self) -> Address {
        self.signer.address()
    }

    #[instrument(skip_all, level = "trace")]
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError> {
        Ok(self.provider.call(tx, None).await?)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcError> {
        let count = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await?;
        u64::try_from(count).map_err(|err| RpcError::Transport(err.to_string()))
    }

    async fn sign(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError> {
        let signature = self
            .signer
            .sign_transaction(tx)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;
        Ok(tx.rlp_signed(&signature))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    async fn trace_transaction(&self, hash: H256) -> Result<CallFrame, RpcError> {
        Ok(self
            .provider
            .request("debug_traceTransaction", (hash, TraceOptions::call_tracer()))
            .await?)
    }
}
