//! Keeper of exa accounts: sends transactions reliably and executes
//! time-locked proposals once they unlock.

#![deny(clippy::unwrap_used, clippy::panic)]

pub use error::{IsRetryable, KeeperError};
pub use events::{
    decode_block, AccountEvent, BlockLog, BlockPayload, DecodedBlock, Proposal, ProposalType,
    Withdraw,
};
pub use keeper::{
    ContractCall, ErrorRegistry, ErrorReporter, Fingerprint, IgnoreOutcome, IgnorePolicy, Keeper,
    KeeperConfig, KnownError, ReportContext, ReportLevel, Revert, SendOptions, SendTransaction,
    Severity, SpanMeta, TracingReporter,
};
pub use metrics::KeeperMetrics;
pub use nonce::{NonceError, NonceInfo, NonceKey, NonceManager, NonceSource, ProviderNonceSource};
pub use provider::{CallFrame, EthersKeeperProvider, KeeperProvider, RpcError};
pub use scheduler::{
    AccountGuard, AccountLocks, ChainReader, MarketAsset, MemoryStore, Notification, Notifier,
    ProposalStore, ProviderChainReader, RedisStore, Scheduler, SchedulerConfig, StoreError,
    StoreQueue, TracingNotifier,
};
pub use service::KeeperService;
pub use settings::{KeeperSettings, SigningKeys, TracingConfig};

pub mod contracts;
mod error;
mod events;
mod keeper;
mod metrics;
mod nonce;
mod provider;
mod scheduler;
mod service;
pub mod settings;
