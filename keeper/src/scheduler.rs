use std::sync::Arc;
use std::time::Duration;

use ethers::abi::{ParamType, Token};
use ethers::types::{Address, U256};
use futures::future::try_join_all;
use serde::Serialize;
use tokio::time::{sleep_until, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, instrument, warn, Instrument, Span};

pub use chain::{ChainReader, MarketAsset, ProviderChainReader};
pub use locks::{AccountGuard, AccountLocks};
pub use notify::{Notification, Notifier, TracingNotifier};
pub use store::{MemoryStore, ProposalStore, RedisStore, StoreError, StoreQueue};

use crate::contracts;
use crate::error::{IsRetryable, KeeperError};
use crate::events::{decode_block, BlockPayload, Proposal, ProposalType, Withdraw};
use crate::keeper::{
    ContractCall, ErrorReporter, ReportContext, ReportLevel, SendOptions, SendTransaction,
    Severity, SpanMeta,
};
use crate::metrics::KeeperMetrics;

use self::queue::{Armed, ReadyQueue};

mod chain;
mod locks;
mod notify;
mod queue;
mod store;

#[cfg(test)]
mod tests;

const EXECUTE: SpanMeta = SpanMeta::new("exa.execute", "exa.execute");
const SKIP_NONCE: SpanMeta = SpanMeta::new("exa.nonce", "exa.nonce");
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Wait after the unlock time before executing.
    pub unlock_grace: Duration,
    /// Wait before retrying a message that failed for a non-contract reason.
    pub retry_delay: Duration,
    /// Market whose withdrawals need an explicit nonce advance after execution.
    pub weth_market: Option<Address>,
    /// Remove legacy withdraws the account reverts, instead of keeping them.
    pub drop_reverted_withdraws: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            unlock_grace: Duration::from_secs(10),
            retry_delay: Duration::from_secs(60),
            weth_market: None,
            drop_reverted_withdraws: false,
        }
    }
}

/// Persists time-locked messages and executes them once unlocked, one at a
/// time per account.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    store: Arc<dyn ProposalStore>,
    sender: Arc<dyn SendTransaction>,
    chain: Arc<dyn ChainReader>,
    notifier: Arc<dyn Notifier>,
    reporter: Arc<dyn ErrorReporter>,
    locks: AccountLocks,
    ready: ReadyQueue,
    tasks: TaskTracker,
    /// Monotonic instant matching `epoch_ms` on the wall clock.
    epoch: Instant,
    epoch_ms: i64,
    metrics: KeeperMetrics,
    config: SchedulerConfig,
}

/// What happened to a message after it was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
enum Outcome {
    Executed,
    Aborted,
    Recovered,
    Skipped,
    Dropped,
    Retry,
    Stuck,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ProposalStore>,
        sender: Arc<dyn SendTransaction>,
        chain: Arc<dyn ChainReader>,
        notifier: Arc<dyn Notifier>,
        reporter: Arc<dyn ErrorReporter>,
        metrics: KeeperMetrics,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                sender,
                chain,
                notifier,
                reporter,
                locks: AccountLocks::default(),
                ready: ReadyQueue::default(),
                tasks: TaskTracker::new(),
                epoch: Instant::now(),
                epoch_ms: chrono::Utc::now().timestamp_millis(),
                metrics,
                config,
            }),
        }
    }

    /// Number of messages armed or executing.
    pub fn pending(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Decodes a block notification and schedules what it proposes.
    ///
    /// Proposals of one account are persisted and armed in nonce order.
    /// Returns the number of newly scheduled messages.
    #[instrument(skip_all, name = "alchemy.block", fields(logs = payload.logs.len()))]
    pub async fn ingest(&self, payload: &BlockPayload) -> Result<usize, KeeperError> {
        let block = decode_block(payload, self.inner.reporter.as_ref());
        if block.is_empty() {
            return Ok(0);
        }
        let proposals = block.proposals.into_values().map(|proposals| async move {
            let mut added = 0;
            for proposal in proposals {
                added += usize::from(self.schedule_proposal(proposal).await?);
            }
            Ok::<_, KeeperError>(added)
        });
        let withdraws = block
            .withdraws
            .into_iter()
            .map(|withdraw| async move {
                Ok::<_, KeeperError>(usize::from(self.schedule_withdraw(withdraw).await?))
            });
        let (proposals, withdraws) =
            futures::try_join!(try_join_all(proposals), try_join_all(withdraws))?;
        Ok(proposals.into_iter().chain(withdraws).sum())
    }

    /// Persists `proposal` and arms it when it was not stored yet.
    #[instrument(
        skip_all,
        name = "schedule proposal",
        fields(
            op = "queue.publish",
            account = ?proposal.account,
            nonce = proposal.nonce,
            proposal_type = %proposal.proposal_type,
            unlock = proposal.unlock,
            messaging.message.id = %proposal.id,
            messaging.destination.name = StoreQueue::Proposals.as_ref(),
        )
    )]
    pub async fn schedule_proposal(&self, mut proposal: Proposal) -> Result<bool, KeeperError> {
        let message = serialize(&proposal)?;
        let added = self
            .inner
            .store
            .add(StoreQueue::Proposals, proposal.score(), &message)
            .await?;
        if added {
            proposal.trace_parent = Span::current().id();
            self.arm_proposal(message, proposal, None);
        } else {
            debug!("Proposal already scheduled");
        }
        Ok(added)
    }

    /// Persists a legacy `withdraw` and arms it when it was not stored yet.
    #[instrument(
        skip_all,
        name = "schedule withdraw",
        fields(
            op = "queue.publish",
            account = ?withdraw.account,
            market = ?withdraw.market,
            receiver = ?withdraw.receiver,
            unlock = withdraw.unlock,
            messaging.message.id = %withdraw.id,
            messaging.destination.name = StoreQueue::Withdraw.as_ref(),
        )
    )]
    pub async fn schedule_withdraw(&self, mut withdraw: Withdraw) -> Result<bool, KeeperError> {
        let message = serialize(&withdraw)?;
        let added = self
            .inner
            .store
            .add(StoreQueue::Withdraw, withdraw.score(), &message)
            .await?;
        if added {
            withdraw.trace_parent = Span::current().id();
            self.arm_withdraw(message, withdraw, None);
        } else {
            debug!("Withdraw already scheduled");
        }
        Ok(added)
    }

    /// Arms every persisted message. Members that fail to parse are reported
    /// and left in the store.
    #[instrument(skip_all)]
    pub async fn rehydrate(&self) -> Result<usize, KeeperError> {
        let (withdraws, proposals) = futures::try_join!(
            self.inner.store.range_all(StoreQueue::Withdraw),
            self.inner.store.range_all(StoreQueue::Proposals),
        )?;
        let mut armed = 0;
        for message in withdraws {
            match serde_json::from_str::<Withdraw>(&message) {
                Ok(withdraw) => {
                    self.arm_withdraw(message, withdraw, None);
                    armed += 1;
                }
                Err(err) => self.report_unparseable(StoreQueue::Withdraw, &message, err),
            }
        }
        for message in proposals {
            match serde_json::from_str::<Proposal>(&message) {
                Ok(proposal) => {
                    self.arm_proposal(message, proposal, None);
                    armed += 1;
                }
                Err(err) => self.report_unparseable(StoreQueue::Proposals, &message, err),
            }
        }
        info!(armed, "Rehydrated scheduled messages");
        Ok(armed)
    }

    fn report_unparseable(&self, queue: StoreQueue, message: &str, err: serde_json::Error) {
        self.inner.reporter.report(
            Severity::Error,
            &KeeperError::Malformed(err.to_string()),
            &ReportContext::new("queue.rehydrate", None)
                .with("queue", queue)
                .with("message", message),
        );
    }

    /// Instant at which `unlock` plus the grace period is reached. Messages
    /// sharing an unlock time share the instant.
    fn due_at(&self, unlock: u64) -> Instant {
        let due_ms = i64::try_from(unlock)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
            .saturating_add(
                i64::try_from(self.inner.config.unlock_grace.as_millis()).unwrap_or(i64::MAX),
            );
        let ahead = u64::try_from(due_ms.saturating_sub(self.inner.epoch_ms)).unwrap_or_default();
        self.inner
            .epoch
            .checked_add(Duration::from_millis(ahead))
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
    }

    /// Arms `proposal` for its unlock time, or for `retry` from now when given.
    fn arm_proposal(&self, message: String, proposal: Proposal, retry: Option<Duration>) {
        let due = match retry {
            Some(retry) => Instant::now() + retry,
            None => self.due_at(proposal.unlock),
        };
        self.inner
            .metrics
            .update_scheduled_metric(StoreQueue::Proposals.as_ref());
        let span = info_span!(
            parent: None,
            "exa.execute",
            op = "exa.execute",
            account = ?proposal.account,
            nonce = proposal.nonce,
            delay_ms = due.saturating_duration_since(Instant::now()).as_millis() as u64,
        );
        span.follows_from(proposal.trace_parent.clone());
        self.arm(due, Armed::Proposal { message, proposal }, span);
    }

    fn arm_withdraw(&self, message: String, withdraw: Withdraw, retry: Option<Duration>) {
        let due = match retry {
            Some(retry) => Instant::now() + retry,
            None => self.due_at(withdraw.unlock),
        };
        self.inner
            .metrics
            .update_scheduled_metric(StoreQueue::Withdraw.as_ref());
        let span = info_span!(
            parent: None,
            "exa.withdraw",
            op = "exa.withdraw",
            account = ?withdraw.account,
            delay_ms = due.saturating_duration_since(Instant::now()).as_millis() as u64,
        );
        span.follows_from(withdraw.trace_parent.clone());
        self.arm(due, Armed::Withdraw { message, withdraw }, span);
    }

    /// Queues `armed` and spawns the timer that runs its account once due.
    fn arm(&self, due: Instant, armed: Armed, span: Span) {
        let account = armed.account();
        self.inner.ready.push(due, armed);
        let scheduler = self.clone();
        self.inner.tasks.spawn(
            async move {
                if due > Instant::now() {
                    sleep_until(due).await;
                }
                scheduler.run_due(account).await;
            }
            .instrument(span),
        );
    }

    /// Executes the due messages of `account` one by one under its lock,
    /// lowest unlock and nonce first.
    async fn run_due(&self, account: Address) {
        let _guard = self.inner.locks.lock(account).await;
        while let Some(armed) = self.inner.ready.pop_due(account, Instant::now()) {
            match armed {
                Armed::Proposal { message, proposal } => {
                    self.execute_proposal(message, proposal).await
                }
                Armed::Withdraw { message, withdraw } => {
                    self.execute_withdraw(message, withdraw).await
                }
            }
        }
    }

    #[instrument(
        skip_all,
        name = "execute proposal",
        fields(
            op = "queue.process",
            account = ?proposal.account,
            market = ?proposal.market,
            amount = %proposal.amount,
            nonce = proposal.nonce,
            proposal_type = %proposal.proposal_type,
            unlock = proposal.unlock,
            messaging.message.id = %proposal.id,
            messaging.destination.name = StoreQueue::Proposals.as_ref(),
            messaging.message.receive.latency = receive_latency_ms(proposal.unlock),
        )
    )]
    async fn execute_proposal(&self, message: String, proposal: Proposal) {
        let outcome = match self.run_proposal(&proposal).await {
            Ok(()) => {
                self.remove(StoreQueue::Proposals, &message).await;
                Outcome::Executed
            }
            Err(err) => self.recover(message, proposal, err).await,
        };
        info!(outcome = outcome.as_ref(), "Processed proposal");
        self.inner
            .metrics
            .update_outcome_metric(StoreQueue::Proposals.as_ref(), outcome.as_ref());
    }

    async fn run_proposal(&self, proposal: &Proposal) -> Result<(), KeeperError> {
        let meta = EXECUTE.with_account(proposal.account);
        let suppressed = SendOptions::default().level(ReportLevel::suppressed());
        if proposal.proposal_type == ProposalType::None {
            self.skip_nonce(proposal, suppressed).await?;
            return Ok(());
        }
        let call = ContractCall::new(
            proposal.account,
            contracts::execute_proposal(),
            vec![Token::Uint(U256::from(proposal.nonce))],
        )
        .with_errors(contracts::account_errors());
        self.inner.sender.exa_send(meta, call, suppressed).await?;

        if proposal.proposal_type == ProposalType::Withdraw {
            if Some(proposal.market) == self.inner.config.weth_market {
                self.skip_nonce(proposal, SendOptions::default()).await?;
            }
            match receiver(proposal) {
                Ok(receiver) => {
                    self.notify_withdraw(proposal.account, proposal.market, proposal.amount, receiver)
                }
                Err(err) => self.inner.reporter.report(
                    Severity::Warning,
                    &err,
                    &proposal_context("exa.notification", proposal),
                ),
            }
        }
        Ok(())
    }

    /// Advances the proposal nonce of the account past `proposal`.
    async fn skip_nonce(&self, proposal: &Proposal, options: SendOptions) -> Result<(), KeeperError> {
        let call = ContractCall::new(
            proposal.account,
            contracts::set_proposal_nonce(),
            vec![Token::Uint(U256::from(proposal.nonce) + 1)],
        )
        .with_errors(contracts::account_errors());
        self.inner
            .sender
            .exa_send(SKIP_NONCE.with_account(proposal.account), call, options)
            .await?;
        Ok(())
    }

    /// Decides what happens to a proposal whose execution failed.
    async fn recover(&self, message: String, proposal: Proposal, err: KeeperError) -> Outcome {
        if is_aborted(&err) {
            debug!(reason = %err.reason(), "Proposal no longer exists");
            self.remove(StoreQueue::Proposals, &message).await;
            return Outcome::Aborted;
        }
        self.inner.reporter.report(
            Severity::Error,
            &err,
            &proposal_context(EXECUTE.op, &proposal),
        );

        if err.revert_name() == Some("NotNext") {
            return match self.reschedule_idle(&message, &proposal).await {
                Ok(()) => Outcome::Recovered,
                Err(recovery) => {
                    self.inner.reporter.report(
                        Severity::Error,
                        &recovery,
                        &proposal_context("exa.recover", &proposal),
                    );
                    self.restore(StoreQueue::Proposals, proposal.score(), &message)
                        .await;
                    self.arm_proposal(message, proposal, Some(self.inner.config.retry_delay));
                    Outcome::Retry
                }
            };
        }

        if err.is_contract_execution() {
            match self.skip_nonce(&proposal, SendOptions::default()).await {
                Ok(()) => {
                    self.remove(StoreQueue::Proposals, &message).await;
                    return Outcome::Skipped;
                }
                Err(skip) if skip.is_contract_execution() => {
                    // kept in the store, the next rehydrate tries again
                    self.inner.reporter.report(
                        Severity::Error,
                        &skip,
                        &proposal_context(SKIP_NONCE.op, &proposal),
                    );
                    return Outcome::Stuck;
                }
                Err(skip) => warn!(reason = %skip.reason(), "Failed to skip proposal nonce"),
            }
        }
        self.arm_proposal(message, proposal, Some(self.inner.config.retry_delay));
        Outcome::Retry
    }

    /// Re-schedules the pending proposals up to the failed one, then drops
    /// the failed member. The previewer's view replaces the stored one.
    #[instrument(skip_all, fields(account = ?proposal.account, nonce = proposal.nonce))]
    async fn reschedule_idle(&self, message: &str, proposal: &Proposal) -> Result<(), KeeperError> {
        self.inner
            .store
            .remove(StoreQueue::Proposals, message)
            .await?;
        let pending = self.inner.chain.pending_proposals(proposal.account).await?;
        let idle = pending
            .into_iter()
            .filter(|idle| idle.nonce <= proposal.nonce)
            .collect::<Vec<_>>();
        info!(
            idle = ?idle.iter().map(|idle| idle.nonce).collect::<Vec<_>>(),
            "Rescheduling idle proposals"
        );
        for idle in idle {
            self.schedule_proposal(idle).await?;
        }
        Ok(())
    }

    #[instrument(
        skip_all,
        name = "process withdraw",
        fields(
            op = "queue.process",
            account = ?withdraw.account,
            market = ?withdraw.market,
            receiver = ?withdraw.receiver,
            amount = %withdraw.amount,
            unlock = withdraw.unlock,
            messaging.message.id = %withdraw.id,
            messaging.destination.name = StoreQueue::Withdraw.as_ref(),
            messaging.message.receive.latency = receive_latency_ms(withdraw.unlock),
        )
    )]
    async fn execute_withdraw(&self, message: String, withdraw: Withdraw) {
        let call = ContractCall::new(withdraw.account, contracts::withdraw(), vec![])
            .with_errors(contracts::account_errors());
        let options = SendOptions::default().level(ReportLevel::suppressed());
        let sent = self
            .inner
            .sender
            .exa_send(EXECUTE.with_account(withdraw.account), call, options)
            .await;

        let outcome = match sent {
            Ok(_) => {
                self.notify_withdraw(
                    withdraw.account,
                    withdraw.market,
                    withdraw.amount,
                    withdraw.receiver,
                );
                self.remove(StoreQueue::Withdraw, &message).await;
                Outcome::Executed
            }
            Err(err) if is_aborted(&err) => {
                self.remove(StoreQueue::Withdraw, &message).await;
                Outcome::Aborted
            }
            Err(err) => {
                self.inner.reporter.report(
                    Severity::Error,
                    &err,
                    &ReportContext::new(EXECUTE.op, Some(withdraw.account))
                        .with("market", format!("{:?}", withdraw.market))
                        .with("unlock", withdraw.unlock),
                );
                if err.is_contract_execution() && self.inner.config.drop_reverted_withdraws {
                    self.remove(StoreQueue::Withdraw, &message).await;
                    Outcome::Dropped
                } else if err.is_retryable() {
                    self.arm_withdraw(message, withdraw, Some(self.inner.config.retry_delay));
                    Outcome::Retry
                } else {
                    Outcome::Stuck
                }
            }
        };
        info!(outcome = outcome.as_ref(), "Processed withdraw");
        self.inner
            .metrics
            .update_outcome_metric(StoreQueue::Withdraw.as_ref(), outcome.as_ref());
    }

    /// Tells the account owner about a completed withdrawal without waiting
    /// for delivery.
    fn notify_withdraw(&self, account: Address, market: Address, amount: U256, receiver: Address) {
        let chain = self.inner.chain.clone();
        let notifier = self.inner.notifier.clone();
        let reporter = self.inner.reporter.clone();
        tokio::spawn(
            async move {
                let notified = async {
                    let asset = chain.market_asset(market).await?;
                    let notification =
                        Notification::withdraw_completed(account, amount, &asset, receiver);
                    notifier.notify(notification).await?;
                    Ok::<_, KeeperError>(())
                };
                if let Err(err) = notified.await {
                    reporter.report(
                        Severity::Error,
                        &err,
                        &ReportContext::new("exa.notification", Some(account)),
                    );
                }
            }
            .instrument(info_span!("notify withdraw", op = "exa.notification")),
        );
    }

    async fn remove(&self, queue: StoreQueue, message: &str) {
        if let Err(err) = self.inner.store.remove(queue, message).await {
            self.inner.reporter.report(
                Severity::Error,
                &KeeperError::Store(err),
                &ReportContext::new("queue.remove", None).with("queue", queue),
            );
        }
    }

    async fn restore(&self, queue: StoreQueue, score: f64, message: &str) {
        if let Err(err) = self.inner.store.add(queue, score, message).await {
            self.inner.reporter.report(
                Severity::Error,
                &KeeperError::Store(err),
                &ReportContext::new("queue.restore", None).with("queue", queue),
            );
        }
    }

    #[cfg(test)]
    async fn drain(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }
}

fn serialize<T: Serialize>(message: &T) -> Result<String, KeeperError> {
    serde_json::to_string(message).map_err(|err| KeeperError::Malformed(err.to_string()))
}

/// Whether the account reports the proposal as gone, directly or through the
/// pre-execution hook of the plugin.
fn is_aborted(err: &KeeperError) -> bool {
    let Some(revert) = err.revert() else {
        return false;
    };
    if revert.is("NoProposal") {
        return true;
    }
    revert.is("PreExecHookReverted")
        && matches!(
            revert.args.get(2),
            Some(Token::Bytes(reason)) if reason.as_slice() == contracts::no_proposal().selector()
        )
}

/// Receiver of a withdraw proposal, the first argument in its data.
fn receiver(proposal: &Proposal) -> Result<Address, KeeperError> {
    match ethers::abi::decode(&[ParamType::Address], &proposal.data) {
        Ok(tokens) => match tokens.as_slice() {
            [Token::Address(receiver)] => Ok(*receiver),
            _ => Err(KeeperError::Malformed("withdraw data: expected an address".to_owned())),
        },
        Err(err) => Err(KeeperError::Malformed(format!("withdraw data: {err}"))),
    }
}

fn proposal_context(operation: &'static str, proposal: &Proposal) -> ReportContext {
    ReportContext::new(operation, Some(proposal.account))
        .with("nonce", proposal.nonce)
        .with("proposal_type", proposal.proposal_type)
}

fn receive_latency_ms(unlock: u64) -> i64 {
    chrono::Utc::now()
        .timestamp_millis()
        .saturating_sub(i64::try_from(unlock).unwrap_or(i64::MAX).saturating_mul(1000))
}
