use std::fmt;
use std::future::Future;
use std::sync::Arc;

use ethers::types::{Address, TransactionReceipt, H256};
use futures::future::{BoxFuture, FutureExt};

use crate::error::KeeperError;

/// Names the span of a send and the account it acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanMeta {
    pub name: &'static str,
    pub op: &'static str,
    pub account: Option<Address>,
}

impl SpanMeta {
    pub const fn new(name: &'static str, op: &'static str) -> Self {
        Self {
            name,
            op,
            account: None,
        }
    }

    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// What an ignore predicate decided for a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreOutcome {
    Propagate,
    /// Resolve the send without a receipt.
    Ignore,
    /// Resolve the send with the given receipt.
    Substitute(Box<TransactionReceipt>),
}

pub type IgnorePredicate = Arc<dyn Fn(String) -> BoxFuture<'static, IgnoreOutcome> + Send + Sync>;

/// Failures that resolve a send successfully instead of failing it.
#[derive(Clone)]
pub enum IgnorePolicy {
    /// Exact failure reasons, e.g. `NotNext()`.
    Reasons(Vec<String>),
    Predicate(IgnorePredicate),
}

impl IgnorePolicy {
    pub fn reasons<I, S>(reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IgnorePolicy::Reasons(reasons.into_iter().map(Into::into).collect())
    }

    pub fn predicate<F, Fut>(predicate: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IgnoreOutcome> + Send + 'static,
    {
        IgnorePolicy::Predicate(Arc::new(move |reason| predicate(reason).boxed()))
    }

    pub async fn evaluate(&self, reason: &str) -> IgnoreOutcome {
        match self {
            IgnorePolicy::Reasons(reasons) if reasons.iter().any(|r| r == reason) => {
                IgnoreOutcome::Ignore
            }
            IgnorePolicy::Reasons(_) => IgnoreOutcome::Propagate,
            IgnorePolicy::Predicate(predicate) => predicate(reason.to_owned()).await,
        }
    }
}

impl fmt::Debug for IgnorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnorePolicy::Reasons(reasons) => f.debug_tuple("Reasons").field(reasons).finish(),
            IgnorePolicy::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

pub type LevelFn = Arc<dyn Fn(&str, &KeeperError) -> Option<Severity> + Send + Sync>;

/// Severity failures are reported with; `None` suppresses the report.
#[derive(Clone)]
pub enum ReportLevel {
    Static(Option<Severity>),
    Dynamic(LevelFn),
}

impl ReportLevel {
    pub fn suppressed() -> Self {
        ReportLevel::Static(None)
    }

    pub fn dynamic<F>(level: F) -> Self
    where
        F: Fn(&str, &KeeperError) -> Option<Severity> + Send + Sync + 'static,
    {
        ReportLevel::Dynamic(Arc::new(level))
    }

    pub fn resolve(&self, reason: &str, error: &KeeperError) -> Option<Severity> {
        match self {
            ReportLevel::Static(severity) => *severity,
            ReportLevel::Dynamic(level) => level(reason, error),
        }
    }
}

impl Default for ReportLevel {
    fn default() -> Self {
        ReportLevel::Static(Some(Severity::Error))
    }
}

impl fmt::Debug for ReportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportLevel::Static(severity) => f.debug_tuple("Static").field(severity).finish(),
            ReportLevel::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

pub type HashCallback = Arc<dyn Fn(H256) -> BoxFuture<'static, eyre::Result<()>> + Send + Sync>;
pub type ReceiptCallback =
    Arc<dyn Fn(TransactionReceipt) -> BoxFuture<'static, eyre::Result<()>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct SendOptions {
    pub ignore: Option<IgnorePolicy>,
    pub level: ReportLevel,
    pub on_hash: Option<HashCallback>,
    pub on_receipt: Option<ReceiptCallback>,
}

impl SendOptions {
    pub fn ignore(mut self, policy: IgnorePolicy) -> Self {
        self.ignore = Some(policy);
        self
    }

    pub fn level(mut self, level: ReportLevel) -> Self {
        self.level = level;
        self
    }

    pub fn on_hash<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(H256) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.on_hash = Some(Arc::new(move |hash| callback(hash).boxed()));
        self
    }

    pub fn on_receipt<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(TransactionReceipt) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.on_receipt = Some(Arc::new(move |receipt| callback(receipt).boxed()));
        self
    }
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("ignore", &self.ignore)
            .field("level", &self.level)
            .field("on_hash", &self.on_hash.is_some())
            .field("on_receipt", &self.on_receipt.is_some())
            .finish()
    }
}
