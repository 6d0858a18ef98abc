use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, Eip1559TransactionRequest, TransactionReceipt, H256, U256, U64};
use ethers::utils::keccak256;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, field, info, info_span, instrument, warn, Instrument, Span};

pub use call::ContractCall;
pub use options::{
    IgnoreOutcome, IgnorePolicy, ReportLevel, SendOptions, Severity, SpanMeta,
};
pub use reporter::{ErrorReporter, ReportContext, TracingReporter};
pub use revert::{ErrorRegistry, Fingerprint, KnownError, Revert};

use crate::error::KeeperError;
use crate::metrics::KeeperMetrics;
use crate::nonce::{NonceKey, NonceManager};
use crate::provider::{KeeperProvider, RpcError};

mod call;
mod options;
mod reporter;
mod retry;
mod revert;


/// Fee and timing parameters of the send pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeeperConfig {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub gas_limit: U256,
    pub rebroadcast_interval: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub trace_retry_count: usize,
    pub trace_retry_delay: Duration,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            max_fee_per_gas: U256::from(1_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000u64),
            gas_limit: U256::from(5_000_000u64),
            rebroadcast_interval: Duration::from_secs(10),
            receipt_timeout: Duration::from_secs(180),
            receipt_poll_interval: Duration::from_secs(4),
            trace_retry_count: 10,
            trace_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Sends contract calls from the keeper account.
#[async_trait]
pub trait SendTransaction: Send + Sync {
    /// Simulates, signs and broadcasts `call` until it is mined.
    ///
    /// Resolves to `None` when a failure was swallowed by the ignore policy.
    async fn exa_send(
        &self,
        meta: SpanMeta,
        call: ContractCall,
        options: SendOptions,
    ) -> Result<Option<TransactionReceipt>, KeeperError>;
}

pub struct Keeper {
    provider: Arc<dyn KeeperProvider>,
    nonces: NonceManager,
    reporter: Arc<dyn ErrorReporter>,
    metrics: KeeperMetrics,
    config: KeeperConfig,
}

impl Keeper {
    pub fn new(
        provider: Arc<dyn KeeperProvider>,
        nonces: NonceManager,
        reporter: Arc<dyn ErrorReporter>,
        metrics: KeeperMetrics,
        config: KeeperConfig,
    ) -> Self {
        Self {
            provider,
            nonces,
            reporter,
            metrics,
            config,
        }
    }

    pub fn nonce_key(&self) -> NonceKey {
        NonceKey::new(self.provider.address(), self.provider.chain_id())
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    async fn send(
        &self,
        meta: SpanMeta,
        call: ContractCall,
        options: SendOptions,
    ) -> Result<Option<TransactionReceipt>, KeeperError> {
        let failure = match self.execute(&meta, &call, &options).await {
            Ok(receipt) => {
                self.metrics.update_send_metric(meta.op, "success");
                if let Some(on_receipt) = options.on_receipt.clone() {
                    self.spawn_callback(&meta, on_receipt(receipt.clone()));
                }
                info!(tx_hash = ?receipt.transaction_hash, "Transaction confirmed");
                return Ok(Some(receipt));
            }
            Err(err) => err,
        };

        let reason = failure.reason();
        if let Some(policy) = &options.ignore {
            match policy.evaluate(&reason).await {
                IgnoreOutcome::Propagate => {}
                IgnoreOutcome::Ignore => {
                    info!(%reason, "Ignoring failed transaction");
                    self.metrics.update_send_metric(meta.op, "ignored");
                    return Ok(None);
                }
                IgnoreOutcome::Substitute(receipt) => {
                    info!(%reason, "Substituting receipt for failed transaction");
                    self.metrics.update_send_metric(meta.op, "ignored");
                    return Ok(Some(*receipt));
                }
            }
        }

        self.metrics
            .update_send_metric(meta.op, failure.to_metrics_label());
        match options.level.resolve(&reason, &failure) {
            Some(severity) => self.reporter.report(
                severity,
                &failure,
                &Self::context(&meta).with("call", call.describe()),
            ),
            None => debug!(%reason, "Suppressed report of failed transaction"),
        }
        Err(failure)
    }

    async fn execute(
        &self,
        meta: &SpanMeta,
        call: &ContractCall,
        options: &SendOptions,
    ) -> Result<TransactionReceipt, KeeperError> {
        let mut tx = self.transaction(call)?;
        self.simulate(&tx, call)
            .instrument(info_span!("eth_call", op = "tx.simulate"))
            .await?;

        let key = self.nonce_key();
        let nonce = self
            .nonces
            .consume(key)
            .instrument(info_span!("prepare transaction", op = "tx.prepare"))
            .await?;
        tx.set_nonce(nonce);
        Span::current().record("tx.nonce", nonce);

        let raw = self
            .provider
            .sign(&tx)
            .instrument(info_span!("sign transaction", op = "tx.sign"))
            .await
            .map_err(KeeperError::SignTransport)?;
        let hash = H256::from(keccak256(&raw));
        Span::current().record("tx.hash", field::debug(hash));

        let receipt = self.confirm(meta, key, nonce, hash, raw, options).await?;
        if receipt.status == Some(U64::one()) {
            return Ok(receipt);
        }
        Err(self
            .classify_revert(meta, hash, call)
            .instrument(info_span!("trace transaction", op = "tx.trace"))
            .await)
    }

    fn transaction(&self, call: &ContractCall) -> Result<TypedTransaction, KeeperError> {
        let request = Eip1559TransactionRequest::new()
            .from(self.provider.address())
            .to(call.address)
            .data(call.calldata()?)
            .gas(self.config.gas_limit)
            .max_fee_per_gas(self.config.max_fee_per_gas)
            .max_priority_fee_per_gas(self.config.max_priority_fee_per_gas)
            .chain_id(self.provider.chain_id());
        Ok(request.into())
    }

    async fn simulate(&self, tx: &TypedTransaction, call: &ContractCall) -> Result<(), KeeperError> {
        match self.provider.call(tx).await {
            Ok(_) => Ok(()),
            Err(RpcError::Reverted { data, .. }) => {
                let data = data.unwrap_or_default();
                Err(KeeperError::SimulationRevert(Revert::decode(
                    &data,
                    &call.errors,
                )))
            }
            Err(err) => Err(KeeperError::Simulation(err)),
        }
    }

    /// Rebroadcasts `raw` until the receipt wait settles, hard resetting the
    /// nonce state when no receipt arrives in time.
    async fn confirm(
        &self,
        meta: &SpanMeta,
        key: NonceKey,
        nonce: u64,
        hash: H256,
        raw: Bytes,
        options: &SendOptions,
    ) -> Result<TransactionReceipt, KeeperError> {
        let cancel = CancellationToken::new();
        let broadcast = self.broadcast_until_cancelled(meta, hash, raw, &cancel);
        let receipt = async {
            let receipt = self.wait_for_receipt(hash).await;
            cancel.cancel();
            receipt
        }
        .instrument(info_span!("wait for receipt", op = "tx.wait"));
        let on_hash = async {
            let Some(on_hash) = &options.on_hash else {
                return;
            };
            if let Err(err) = on_hash(hash).await {
                self.reporter.report(
                    Severity::Error,
                    &KeeperError::EyreError(err),
                    &Self::context(meta).with("callback", "on_hash"),
                );
            }
        };
        let ((), receipt, ()) = tokio::join!(broadcast, receipt, on_hash);

        match receipt {
            Some(receipt) => Ok(receipt),
            None => {
                let info = self.nonces.info(key);
                info_span!(
                    "nonce reset",
                    op = "tx.reset",
                    tx.nonce = nonce,
                    exa.delta = info.delta,
                    exa.nonce = ?info.nonce
                )
                .in_scope(|| {
                    warn!(?hash, nonce, "Timed out while waiting for transaction");
                    self.nonces.hard_reset(key);
                });
                self.metrics.update_receipt_timeout_metric(meta.op);
                Err(KeeperError::ReceiptTimeout { hash, nonce })
            }
        }
    }

    async fn broadcast_until_cancelled(
        &self,
        meta: &SpanMeta,
        hash: H256,
        raw: Bytes,
        cancel: &CancellationToken,
    ) {
        while !cancel.is_cancelled() {
            let send = async {
                let sent = self
                    .provider
                    .send_raw_transaction(raw.clone())
                    .instrument(info_span!("send transaction", op = "tx.send"))
                    .await;
                if let Err(source) = sent {
                    self.metrics.update_broadcast_error_metric(meta.op);
                    self.reporter.report(
                        Severity::Error,
                        &KeeperError::Broadcast { hash, source },
                        &Self::context(meta),
                    );
                }
            };
            let pause = async {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = sleep(self.config.rebroadcast_interval) => {}
                }
            };
            tokio::join!(send, pause);
        }
    }

    async fn wait_for_receipt(&self, hash: H256) -> Option<TransactionReceipt> {
        let poll = async {
            loop {
                match self.provider.transaction_receipt(hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(err) => {
                        debug!(?err, ?hash, "Error polling receipt. Retrying...");
                        self.metrics
                            .update_call_retries_metric("rpc", "transaction_receipt");
                    }
                }
                sleep(self.config.receipt_poll_interval).await;
            }
        };
        timeout(self.config.receipt_timeout, poll).await.ok()
    }

    async fn classify_revert(&self, meta: &SpanMeta, hash: H256, call: &ContractCall) -> KeeperError {
        let trace = retry::call_with_retries(
            || self.provider.trace_transaction(hash),
            self.config.trace_retry_count,
            self.config.trace_retry_delay,
            RpcError::is_invalid_input,
            "trace_transaction",
            &self.metrics,
        )
        .await;
        match trace {
            Ok(frame) => {
                let output = frame.output.unwrap_or_default();
                KeeperError::ExecutionReverted(Revert::decode(&output, &call.errors))
            }
            Err(err) => {
                self.reporter.report(
                    Severity::Error,
                    &KeeperError::Rpc(err),
                    &Self::context(meta).with("tx_hash", format!("{hash:?}")),
                );
                KeeperError::TraceUnavailable(hash)
            }
        }
    }

    fn spawn_callback(
        &self,
        meta: &SpanMeta,
        callback: futures::future::BoxFuture<'static, eyre::Result<()>>,
    ) {
        let reporter = self.reporter.clone();
        let context = Self::context(meta).with("callback", "on_receipt");
        tokio::spawn(
            async move {
                if let Err(err) = callback.await {
                    reporter.report(Severity::Error, &KeeperError::EyreError(err), &context);
                }
            }
            .instrument(Span::current()),
        );
    }

    fn context(meta: &SpanMeta) -> ReportContext {
        ReportContext::new(meta.op, meta.account)
    }
}

#[async_trait]
impl SendTransaction for Keeper {
    #[instrument(
        skip_all,
        name = "Keeper::exa_send",
        fields(
            name = meta.name,
            op = meta.op,
            account = ?meta.account,
            tx.call = %call.describe(),
            tx.to = ?call.address,
            tx.nonce = field::Empty,
            tx.hash = field::Empty,
        )
    )]
    async fn exa_send(
        &self,
        meta: SpanMeta,
        call: ContractCall,
        options: SendOptions,
    ) -> Result<Option<TransactionReceipt>, KeeperError> {
        self.send(meta, call, options).await
    }
}
