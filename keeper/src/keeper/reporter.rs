use std::collections::BTreeMap;

use ethers::types::Address;
use tracing::{error, warn};

use crate::error::KeeperError;

use super::options::Severity;

/// Correlation data attached to a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportContext {
    pub operation: &'static str,
    pub account: Option<Address>,
    pub extra: BTreeMap<&'static str, String>,
}

impl ReportContext {
    pub fn new(operation: &'static str, account: Option<Address>) -> Self {
        Self {
            operation,
            account,
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.extra.insert(key, value.to_string());
        self
    }
}

/// Sink for failures that need an operator's attention.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, severity: Severity, error: &KeeperError, context: &ReportContext);
}

/// Reports failures as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, severity: Severity, error: &KeeperError, context: &ReportContext) {
        let fingerprint = error.fingerprint();
        match severity {
            Severity::Error => error!(
                ?error,
                reason = %error.reason(),
                ?fingerprint,
                operation = context.operation,
                account = ?context.account,
                extra = ?context.extra,
                "Keeper failure"
            ),
            Severity::Warning => warn!(
                ?error,
                reason = %error.reason(),
                ?fingerprint,
                operation = context.operation,
                account = ?context.account,
                extra = ?context.extra,
                "Keeper failure"
            ),
        }
    }
}
