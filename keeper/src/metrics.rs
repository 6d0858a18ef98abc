use prometheus::{
    opts, register_int_counter_vec_with_registry, register_int_counter_with_registry, Encoder,
    IntCounter, IntCounterVec, Registry,
};

const METRICS_NAMESPACE: &str = "keeper";

/// Prefix a metric name with the namespace.
fn namespaced(name: &str) -> String {
    format!("{}_{}", METRICS_NAMESPACE, name)
}

/// Metrics for the transaction pipeline and the proposal scheduler
#[derive(Clone)]
pub struct KeeperMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,

    // labelled by span operation and outcome, e.g. "success", "ignored" or the error kind
    pub sends: IntCounterVec,
    pub broadcast_errors: IntCounterVec,
    pub receipt_timeouts: IntCounterVec,
    pub nonce_hard_resets: IntCounter,

    // includes a label for the error causing the retry, and a label for the type of call
    pub call_retries: IntCounterVec,

    pub scheduled_messages: IntCounterVec,
    // labelled by queue and outcome, e.g. "executed", "recovered", "skipped", "aborted", "retry"
    pub message_outcomes: IntCounterVec,
}

impl KeeperMetrics {
    pub fn new(registry: Registry) -> eyre::Result<Self> {
        let sends = register_int_counter_vec_with_registry!(
            opts!(namespaced("sends"), "The number of transaction sends by outcome"),
            &["operation", "outcome",],
            registry.clone()
        )?;
        let broadcast_errors = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("broadcast_errors"),
                "The number of failed raw transaction broadcasts",
            ),
            &["operation",],
            registry.clone()
        )?;
        let receipt_timeouts = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("receipt_timeouts"),
                "The number of transactions that were not mined before the receipt timeout",
            ),
            &["operation",],
            registry.clone()
        )?;
        let nonce_hard_resets = register_int_counter_with_registry!(
            opts!(
                namespaced("nonce_hard_resets"),
                "The number of times the nonce state of the keeper was discarded",
            ),
            registry.clone()
        )?;
        let call_retries = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("call_retries"),
                "The number of times an RPC call was retried",
            ),
            &["error_type", "call_type",],
            registry.clone()
        )?;
        let scheduled_messages = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("scheduled_messages"),
                "The number of messages armed for delayed execution",
            ),
            &["queue",],
            registry.clone()
        )?;
        let message_outcomes = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("message_outcomes"),
                "The number of scheduled messages processed, by outcome",
            ),
            &["queue", "outcome",],
            registry.clone()
        )?;
        Ok(Self {
            registry,
            sends,
            broadcast_errors,
            receipt_timeouts,
            nonce_hard_resets,
            call_retries,
            scheduled_messages,
            message_outcomes,
        })
    }

    pub fn update_send_metric(&self, operation: &str, outcome: &str) {
        self.sends.with_label_values(&[operation, outcome]).inc();
    }

    pub fn update_broadcast_error_metric(&self, operation: &str) {
        self.broadcast_errors.with_label_values(&[operation]).inc();
    }

    pub fn update_receipt_timeout_metric(&self, operation: &str) {
        self.receipt_timeouts.with_label_values(&[operation]).inc();
        self.nonce_hard_resets.inc();
    }

    pub fn update_call_retries_metric(&self, error_type: &str, call_type: &str) {
        self.call_retries
            .with_label_values(&[error_type, call_type])
            .inc();
    }

    pub fn update_scheduled_metric(&self, queue: &str) {
        self.scheduled_messages.with_label_values(&[queue]).inc();
    }

    pub fn update_outcome_metric(&self, queue: &str, outcome: &str) {
        self.message_outcomes
            .with_label_values(&[queue, outcome])
            .inc();
    }

    /// Encode all registered metrics in the prometheus text format.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    #[cfg(test)]
    pub fn dummy_instance() -> Self {
        let registry = Registry::new();
        let instance = Self::new(registry);
        instance.unwrap()
    }
}
