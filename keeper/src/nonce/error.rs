/// Errors of the nonce manager.
///
/// Cloneable so a single failed reconciliation can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NonceError {
    #[error("Failed to fetch nonce for {key}: {message}")]
    Fetch { key: String, message: String },
    #[error("Failed to persist nonce {nonce} for {key}: {message}")]
    Persist {
        key: String,
        nonce: u64,
        message: String,
    },
}
