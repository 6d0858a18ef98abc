use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::contract::EthEvent;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use parking_lot::Mutex;
use tokio::time::sleep;

use crate::contracts;
use crate::error::KeeperError;
use crate::events::{BlockLog, BlockPayload, Proposal, ProposalType, ProposedFilter, Withdraw};
use crate::keeper::tests::RecordingReporter;
use crate::keeper::{ContractCall, ReportLevel, Revert, SendOptions, SendTransaction, SpanMeta};
use crate::metrics::KeeperMetrics;
use crate::provider::tests::MockProvider;

use super::queue::{Armed, ReadyQueue};
use super::{
    AccountLocks, ChainReader, MarketAsset, MemoryStore, Notification, Notifier, ProposalStore,
    ProviderChainReader, Scheduler, SchedulerConfig, StoreQueue,
};

const DAY: u64 = 86_400;

/// Sends nothing; fails calls with the scripted errors, in order.
#[derive(Default)]
struct FakeSender {
    sent: Mutex<Vec<(String, bool)>>,
    failures: Mutex<HashMap<String, VecDeque<KeeperError>>>,
}

impl FakeSender {
    fn fail(&self, call: &str, error: KeeperError) {
        self.failures
            .lock()
            .entry(call.to_owned())
            .or_default()
            .push_back(error);
    }

    fn calls(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(call, _)| call.clone()).collect()
    }
}

#[async_trait]
impl SendTransaction for FakeSender {
    async fn exa_send(
        &self,
        _meta: SpanMeta,
        call: ContractCall,
        options: SendOptions,
    ) -> Result<Option<TransactionReceipt>, KeeperError> {
        let call = call.describe();
        let suppressed = matches!(options.level, ReportLevel::Static(None));
        self.sent.lock().push((call.clone(), suppressed));
        let failure = self
            .failures
            .lock()
            .get_mut(&call)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(err) => Err(err),
            None => Ok(Some(TransactionReceipt::default())),
        }
    }
}

#[derive(Default)]
struct FakeChain {
    pending: Mutex<Vec<Proposal>>,
    unavailable: Mutex<bool>,
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn pending_proposals(&self, _account: Address) -> Result<Vec<Proposal>, KeeperError> {
        if *self.unavailable.lock() {
            return Err(KeeperError::Malformed("previewer unavailable".to_owned()));
        }
        Ok(self.pending.lock().clone())
    }

    async fn market_asset(&self, _market: Address) -> Result<MarketAsset, KeeperError> {
        Ok(MarketAsset {
            decimals: 18,
            symbol: "exaWETH".to_owned(),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> eyre::Result<()> {
        self.notifications.lock().push(notification);
        Ok(())
    }
}

struct TestScheduler {
    scheduler: Scheduler,
    store: Arc<MemoryStore>,
    sender: Arc<FakeSender>,
    chain: Arc<FakeChain>,
    notifier: Arc<RecordingNotifier>,
    reporter: Arc<RecordingReporter>,
    metrics: KeeperMetrics,
}

impl TestScheduler {
    fn new(config: SchedulerConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        let sender = Arc::new(FakeSender::default());
        let chain = Arc::new(FakeChain::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = Arc::new(RecordingReporter::default());
        let metrics = KeeperMetrics::dummy_instance();
        let scheduler = Scheduler::new(
            store.clone(),
            sender.clone(),
            chain.clone(),
            notifier.clone(),
            reporter.clone(),
            metrics.clone(),
            config,
        );
        Self {
            scheduler,
            store,
            sender,
            chain,
            notifier,
            reporter,
            metrics,
        }
    }

    async fn stored(&self, queue: StoreQueue) -> Vec<String> {
        self.store.range_all(queue).await.unwrap()
    }

    fn outcomes(&self, queue: StoreQueue, outcome: &str) -> u64 {
        self.metrics
            .message_outcomes
            .with_label_values(&[queue.as_ref(), outcome])
            .get()
    }
}

fn account() -> Address {
    Address::repeat_byte(0xaa)
}

fn market() -> Address {
    Address::repeat_byte(0x0c)
}

fn receiver() -> Address {
    Address::from_slice(&hex::decode("1234567890abcdef1234567890abcdef1234abcd").unwrap())
}

fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap()
}

fn proposal(nonce: u64, proposal_type: ProposalType, unlock: u64) -> Proposal {
    Proposal::new(
        account(),
        market(),
        U256::exp10(18) * 3 / 2,
        abi::encode(&[Token::Address(receiver())]).into(),
        nonce,
        proposal_type,
        unlock,
        1_700_000_000 + nonce,
    )
}

fn withdraw(unlock: u64) -> Withdraw {
    Withdraw::new(
        account(),
        market(),
        receiver(),
        U256::exp10(18),
        unlock,
        1_700_000_000,
    )
}

fn reverted(error: crate::keeper::KnownError, args: &[Token]) -> KeeperError {
    KeeperError::ExecutionReverted(Revert::decode(
        &error.encode(args),
        &contracts::account_errors(),
    ))
}

fn wrapped_no_proposal() -> KeeperError {
    reverted(
        contracts::pre_exec_hook_reverted(),
        &[
            Token::Address(Address::repeat_byte(0x91)),
            Token::Uint(U256::one()),
            Token::Bytes(contracts::no_proposal().encode(&[]).to_vec()),
        ],
    )
}

fn proposed_log(nonce: u64, unlock: u64) -> BlockLog {
    BlockLog {
        topics: vec![
            ProposedFilter::signature(),
            H256::from(account()),
            H256::from_low_u64_be(nonce),
            H256::from(market()),
        ],
        data: abi::encode(&[
            Token::Uint(U256::from(ProposalType::RollDebt as u8)),
            Token::Uint(U256::exp10(6)),
            Token::Bytes(vec![]),
            Token::Uint(unlock.into()),
        ])
        .into(),
        contract_address: account(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_proposal_executes_after_unlock_and_grace() {
    let test = TestScheduler::new(SchedulerConfig::default());
    let unlock = now() + 30;

    assert!(test
        .scheduler
        .schedule_proposal(proposal(1, ProposalType::RollDebt, unlock))
        .await
        .unwrap());

    sleep(Duration::from_secs(35)).await;
    assert!(test.sender.calls().is_empty());
    assert_eq!(test.stored(StoreQueue::Proposals).await.len(), 1);

    sleep(Duration::from_secs(10)).await;
    test.scheduler.drain().await;
    assert_eq!(test.sender.calls(), vec!["executeProposal(1)"]);
    assert!(test.stored(StoreQueue::Proposals).await.is_empty());
    assert_eq!(test.outcomes(StoreQueue::Proposals, "executed"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_delivery_is_armed_once() {
    let test = TestScheduler::new(SchedulerConfig::default());
    let proposal = proposal(1, ProposalType::Redeem, now() - DAY);

    assert!(test
        .scheduler
        .schedule_proposal(proposal.clone())
        .await
        .unwrap());
    assert!(!test.scheduler.schedule_proposal(proposal).await.unwrap());

    test.scheduler.drain().await;
    assert_eq!(test.sender.calls(), vec!["executeProposal(1)"]);
}

#[tokio::test(start_paused = true)]
async fn test_same_block_proposals_execute_in_nonce_order() {
    let test = TestScheduler::new(SchedulerConfig::default());
    let unlock = now() - DAY;
    let payload = BlockPayload {
        block_timestamp: Some(now()),
        logs: vec![proposed_log(6, unlock), proposed_log(5, unlock)],
    };

    let added = test.scheduler.ingest(&payload).await.unwrap();
    test.scheduler.drain().await;

    assert_eq!(added, 2);
    assert_eq!(
        test.sender.calls(),
        vec!["executeProposal(5)", "executeProposal(6)"]
    );
    assert!(test.stored(StoreQueue::Proposals).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_block_proposals_keep_nonce_order_across_workers() {
    for _ in 0..20 {
        let test = TestScheduler::new(SchedulerConfig::default());
        let unlock = now() - DAY;
        let payload = BlockPayload {
            block_timestamp: Some(now()),
            logs: vec![proposed_log(6, unlock), proposed_log(5, unlock)],
        };

        let scheduler = test.scheduler.clone();
        let added = tokio::spawn(async move { scheduler.ingest(&payload).await })
            .await
            .unwrap()
            .unwrap();
        test.scheduler.drain().await;

        assert_eq!(added, 2);
        assert_eq!(
            test.sender.calls(),
            vec!["executeProposal(5)", "executeProposal(6)"]
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_proposals_unlocking_together_keep_nonce_order() {
    let test = TestScheduler::new(SchedulerConfig {
        unlock_grace: Duration::ZERO,
        ..Default::default()
    });
    let unlock = now() + 1;
    for nonce in [6, 5] {
        let proposal = proposal(nonce, ProposalType::RollDebt, unlock);
        test.store
            .add(
                StoreQueue::Proposals,
                proposal.score(),
                &serde_json::to_string(&proposal).unwrap(),
            )
            .await
            .unwrap();
    }

    assert_eq!(test.scheduler.rehydrate().await.unwrap(), 2);
    test.scheduler.drain().await;

    assert_eq!(
        test.sender.calls(),
        vec!["executeProposal(5)", "executeProposal(6)"]
    );
    assert_eq!(test.scheduler.inner.ready.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ready_queue_hands_out_due_messages_in_nonce_order() {
    let queue = ReadyQueue::default();
    let now = tokio::time::Instant::now();
    let armed = |nonce: u64, unlock: u64| Armed::Proposal {
        message: nonce.to_string(),
        proposal: proposal(nonce, ProposalType::Redeem, unlock),
    };
    queue.push(now, armed(6, 100));
    queue.push(now, armed(5, 100));
    queue.push(now + Duration::from_secs(60), armed(4, 100));
    queue.push(now, armed(9, 200));
    let pop = |at: tokio::time::Instant| match queue.pop_due(account(), at) {
        Some(Armed::Proposal { proposal, .. }) => Some(proposal.nonce),
        _ => None,
    };

    assert_eq!(pop(now), Some(5));
    assert_eq!(pop(now), Some(6));
    assert_eq!(pop(now), Some(9));
    assert_eq!(pop(now), None);
    assert_eq!(pop(now + Duration::from_secs(60)), Some(4));
    assert_eq!(queue.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rehydrate_arms_exactly_the_stored_messages() {
    let test = TestScheduler::new(SchedulerConfig::default());
    let past = now() - DAY;
    for proposal in [
        proposal(1, ProposalType::RollDebt, past),
        proposal(2, ProposalType::RollDebt, past),
    ] {
        let message = serde_json::to_string(&proposal).unwrap();
        test.store
            .add(StoreQueue::Proposals, proposal.score(), &message)
            .await
            .unwrap();
    }
    let legacy = withdraw(past);
    test.store
        .add(
            StoreQueue::Withdraw,
            legacy.score(),
            &serde_json::to_string(&legacy).unwrap(),
        )
        .await
        .unwrap();
    test.store
        .add(StoreQueue::Proposals, 0.0, "not a proposal")
        .await
        .unwrap();

    let armed = test.scheduler.rehydrate().await.unwrap();
    test.scheduler.drain().await;

    assert_eq!(armed, 3);
    let mut calls = test.sender.calls();
    calls.sort();
    assert_eq!(
        calls,
        vec!["executeProposal(1)", "executeProposal(2)", "withdraw()"]
    );
    assert_eq!(
        test.stored(StoreQueue::Proposals).await,
        vec!["not a proposal"]
    );
    assert!(test.stored(StoreQueue::Withdraw).await.is_empty());
    assert_eq!(test.reporter.reports.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_not_next_reschedules_idle_proposals() {
    let test = TestScheduler::new(SchedulerConfig::default());
    let past = now() - DAY;
    test.sender
        .fail("executeProposal(6)", reverted(contracts::not_next(), &[]));
    *test.chain.pending.lock() = vec![
        proposal(5, ProposalType::RollDebt, past),
        proposal(6, ProposalType::RollDebt, past),
        proposal(7, ProposalType::RollDebt, past + DAY * 2),
    ];

    test.scheduler
        .schedule_proposal(proposal(6, ProposalType::RollDebt, past))
        .await
        .unwrap();
    test.scheduler.drain().await;

    assert_eq!(
        test.sender.calls(),
        vec![
            "executeProposal(6)",
            "executeProposal(5)",
            "executeProposal(6)"
        ]
    );
    assert!(test.stored(StoreQueue::Proposals).await.is_empty());
    assert_eq!(test.reporter.reasons(), vec!["NotNext()"]);
    assert_eq!(test.outcomes(StoreQueue::Proposals, "recovered"), 1);
    assert_eq!(test.outcomes(StoreQueue::Proposals, "executed"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_idle_recovery_keeps_the_proposal() {
    let test = TestScheduler::new(SchedulerConfig::default());
    let failed = proposal(6, ProposalType::RollDebt, now() - DAY);
    test.sender
        .fail("executeProposal(6)", reverted(contracts::not_next(), &[]));
    *test.chain.unavailable.lock() = true;

    test.scheduler
        .schedule_proposal(failed.clone())
        .await
        .unwrap();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(
        test.stored(StoreQueue::Proposals).await,
        vec![serde_json::to_string(&failed).unwrap()]
    );
    assert_eq!(
        test.reporter.reasons(),
        vec![
            "NotNext()".to_owned(),
            "Malformed message: previewer unavailable".to_owned()
        ]
    );

    *test.chain.unavailable.lock() = false;
    sleep(Duration::from_secs(60)).await;
    test.scheduler.drain().await;
    assert_eq!(
        test.sender.calls(),
        vec!["executeProposal(6)", "executeProposal(6)"]
    );
    assert!(test.stored(StoreQueue::Proposals).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_proposal_aborts_without_report() {
    let test = TestScheduler::new(SchedulerConfig::default());
    test.sender.fail("executeProposal(3)", wrapped_no_proposal());

    test.scheduler
        .schedule_proposal(proposal(3, ProposalType::Redeem, now() - DAY))
        .await
        .unwrap();
    test.scheduler.drain().await;

    assert_eq!(test.sender.calls(), vec!["executeProposal(3)"]);
    assert!(test.stored(StoreQueue::Proposals).await.is_empty());
    assert!(test.reporter.reports.lock().is_empty());
    assert_eq!(test.outcomes(StoreQueue::Proposals, "aborted"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_contract_revert_skips_the_nonce() {
    let test = TestScheduler::new(SchedulerConfig::default());
    test.sender.fail(
        "executeProposal(3)",
        reverted(
            crate::keeper::KnownError::new("InsufficientBalance", vec![]),
            &[],
        ),
    );

    test.scheduler
        .schedule_proposal(proposal(3, ProposalType::Swap, now() - DAY))
        .await
        .unwrap();
    test.scheduler.drain().await;

    assert_eq!(
        test.sender.calls(),
        vec!["executeProposal(3)", "setProposalNonce(4)"]
    );
    // the skip is reported by the keeper itself
    assert_eq!(
        test.sender.sent.lock().iter().map(|(_, suppressed)| *suppressed).collect::<Vec<_>>(),
        vec![true, false]
    );
    assert!(test.stored(StoreQueue::Proposals).await.is_empty());
    let reports = test.reporter.reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1, "InsufficientBalance()");
    assert_eq!(reports[0].2.account, Some(account()));
    assert_eq!(reports[0].2.extra.get("nonce").map(String::as_str), Some("3"));
    assert_eq!(
        reports[0].2.extra.get("proposal_type").map(String::as_str),
        Some("Swap")
    );
}

#[tokio::test(start_paused = true)]
async fn test_reverted_skip_leaves_the_proposal_stuck() {
    let test = TestScheduler::new(SchedulerConfig::default());
    let insufficient = || {
        reverted(
            crate::keeper::KnownError::new("InsufficientBalance", vec![]),
            &[],
        )
    };
    test.sender.fail("executeProposal(3)", insufficient());
    test.sender.fail("setProposalNonce(4)", insufficient());

    test.scheduler
        .schedule_proposal(proposal(3, ProposalType::Swap, now() - DAY))
        .await
        .unwrap();
    test.scheduler.drain().await;

    assert_eq!(
        test.sender.calls(),
        vec!["executeProposal(3)", "setProposalNonce(4)"]
    );
    assert_eq!(test.scheduler.pending(), 0);
    assert_eq!(test.stored(StoreQueue::Proposals).await.len(), 1);
    assert_eq!(test.outcomes(StoreQueue::Proposals, "stuck"), 1);
    assert_eq!(test.reporter.reports.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_is_retried_later() {
    let test = TestScheduler::new(SchedulerConfig::default());
    test.sender.fail(
        "executeProposal(3)",
        KeeperError::ReceiptTimeout {
            hash: H256::zero(),
            nonce: 7,
        },
    );

    test.scheduler
        .schedule_proposal(proposal(3, ProposalType::Redeem, now() - DAY))
        .await
        .unwrap();
    sleep(Duration::from_secs(59)).await;

    assert_eq!(test.sender.calls(), vec!["executeProposal(3)"]);
    assert_eq!(test.stored(StoreQueue::Proposals).await.len(), 1);
    assert_eq!(test.outcomes(StoreQueue::Proposals, "retry"), 1);

    sleep(Duration::from_secs(2)).await;
    test.scheduler.drain().await;
    assert_eq!(
        test.sender.calls(),
        vec!["executeProposal(3)", "executeProposal(3)"]
    );
    assert!(test.stored(StoreQueue::Proposals).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_none_proposal_only_advances_the_nonce() {
    let test = TestScheduler::new(SchedulerConfig::default());

    test.scheduler
        .schedule_proposal(proposal(8, ProposalType::None, now() - DAY))
        .await
        .unwrap();
    test.scheduler.drain().await;

    assert_eq!(test.sender.calls(), vec!["setProposalNonce(9)"]);
    assert!(test.stored(StoreQueue::Proposals).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_weth_withdraw_advances_nonce_and_notifies() {
    let test = TestScheduler::new(SchedulerConfig {
        weth_market: Some(market()),
        ..Default::default()
    });

    test.scheduler
        .schedule_proposal(proposal(3, ProposalType::Withdraw, now() - DAY))
        .await
        .unwrap();
    test.scheduler.drain().await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(
        test.sender.calls(),
        vec!["executeProposal(3)", "setProposalNonce(4)"]
    );
    assert_eq!(
        *test.notifier.notifications.lock(),
        vec![Notification {
            user_id: account(),
            heading: "Withdraw completed".to_owned(),
            contents: "1.5 WETH sent to 0x1234...abcd".to_owned(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_legacy_withdraw_executes_and_notifies() {
    let test = TestScheduler::new(SchedulerConfig::default());

    test.scheduler
        .schedule_withdraw(withdraw(now() - DAY))
        .await
        .unwrap();
    test.scheduler.drain().await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(test.sender.calls(), vec!["withdraw()"]);
    assert!(test.stored(StoreQueue::Withdraw).await.is_empty());
    assert_eq!(test.notifier.notifications.lock().len(), 1);
    assert_eq!(
        test.notifier.notifications.lock()[0].contents,
        "1 WETH sent to 0x1234...abcd"
    );
}

#[tokio::test(start_paused = true)]
async fn test_legacy_withdraw_without_proposal_is_removed() {
    let test = TestScheduler::new(SchedulerConfig::default());
    test.sender.fail("withdraw()", wrapped_no_proposal());

    test.scheduler
        .schedule_withdraw(withdraw(now() - DAY))
        .await
        .unwrap();
    test.scheduler.drain().await;

    assert!(test.stored(StoreQueue::Withdraw).await.is_empty());
    assert!(test.reporter.reports.lock().is_empty());
    assert!(test.notifier.notifications.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reverted_legacy_withdraw_is_kept_unless_dropping() {
    for (drop_reverted_withdraws, remaining) in [(false, 1), (true, 0)] {
        let test = TestScheduler::new(SchedulerConfig {
            drop_reverted_withdraws,
            ..Default::default()
        });
        test.sender.fail(
            "withdraw()",
            reverted(crate::keeper::KnownError::new("NoBalance", vec![]), &[]),
        );

        test.scheduler
            .schedule_withdraw(withdraw(now() - DAY))
            .await
            .unwrap();
        test.scheduler.drain().await;

        assert_eq!(test.sender.calls(), vec!["withdraw()"]);
        assert_eq!(test.stored(StoreQueue::Withdraw).await.len(), remaining);
        assert_eq!(test.reporter.reasons(), vec!["NoBalance()"]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_account_lock_is_exclusive() {
    let locks = AccountLocks::default();

    let guard = locks.lock(account()).await;
    let waiting = tokio::spawn({
        let locks = locks.clone();
        async move {
            let _guard = locks.lock(account()).await;
        }
    });
    sleep(Duration::from_millis(10)).await;
    assert!(!waiting.is_finished());

    drop(guard);
    waiting.await.unwrap();
    assert!(locks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_different_accounts_do_not_block_each_other() {
    let locks = AccountLocks::default();

    let _first = locks.lock(account()).await;
    let _second = locks.lock(Address::repeat_byte(0xbb)).await;

    assert_eq!(locks.len(), 2);
}

#[tokio::test]
async fn test_idle_lock_entries_are_removed() {
    let locks = AccountLocks::default();

    drop(locks.lock(account()).await);

    assert!(locks.is_empty());
}

#[tokio::test]
async fn test_chain_reader_maps_pending_proposals() {
    let previewer = Address::repeat_byte(0x77);
    let output = abi::encode(&[Token::Array(vec![Token::Tuple(vec![
        Token::Uint(5.into()),
        Token::Tuple(vec![
            Token::Uint(U256::exp10(6)),
            Token::Address(market()),
            Token::Bytes(vec![0xde, 0xad]),
            Token::Uint((ProposalType::RepayAtMaturity as u8).into()),
            Token::Uint(1_700_000_000u64.into()),
        ]),
        Token::Uint(1_700_003_600u64.into()),
    ])])]);
    let mut provider = MockProvider::new();
    provider
        .expect_call()
        .withf(move |tx| tx.to_addr() == Some(&previewer))
        .times(1)
        .returning(move |_| Ok(Bytes::from(output.clone())));
    let reader = ProviderChainReader::new(Arc::new(provider), previewer);

    let pending = reader.pending_proposals(account()).await.unwrap();

    assert_eq!(
        pending,
        vec![Proposal::new(
            account(),
            market(),
            U256::exp10(6),
            Bytes::from(vec![0xde, 0xad]),
            5,
            ProposalType::RepayAtMaturity,
            1_700_003_600,
            1_700_000_000,
        )]
    );
}

#[tokio::test]
async fn test_chain_reader_reads_market_asset() {
    let mut provider = MockProvider::new();
    provider.expect_call().times(2).returning(|tx| {
        let data = tx.data().cloned().unwrap_or_default();
        let output = if data.as_ref() == contracts::decimals().short_signature() {
            abi::encode(&[Token::Uint(6.into())])
        } else {
            abi::encode(&[Token::String("exaUSDC".to_owned())])
        };
        Ok(Bytes::from(output))
    });
    let reader = ProviderChainReader::new(Arc::new(provider), Address::zero());

    let asset = reader.market_asset(market()).await.unwrap();

    assert_eq!(
        asset,
        MarketAsset {
            decimals: 6,
            symbol: "exaUSDC".to_owned(),
        }
    );
}

#[test]
fn test_withdraw_notification_formats_amount() {
    let asset = MarketAsset {
        decimals: 6,
        symbol: "exaUSDC".to_owned(),
    };

    let notification =
        Notification::withdraw_completed(account(), U256::from(2_500_000u64), &asset, receiver());

    assert_eq!(notification.heading, "Withdraw completed");
    assert_eq!(notification.contents, "2.5 USDC sent to 0x1234...abcd");
}

#[tokio::test]
async fn test_memory_store_orders_by_score() {
    let store = MemoryStore::default();

    assert!(store.add(StoreQueue::Proposals, 20.0, "b").await.unwrap());
    assert!(store.add(StoreQueue::Proposals, 10.0, "a").await.unwrap());
    assert!(!store.add(StoreQueue::Proposals, 10.0, "a").await.unwrap());
    assert!(store.remove(StoreQueue::Withdraw, "a").await.map(|removed| !removed).unwrap());

    assert_eq!(store.range_all(StoreQueue::Proposals).await.unwrap(), vec!["a", "b"]);
    assert!(store.range_all(StoreQueue::Withdraw).await.unwrap().is_empty());
}
