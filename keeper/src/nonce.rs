pub use error::NonceError;
pub use manager::{NonceInfo, NonceManager};
pub use source::{NonceKey, NonceSource, ProviderNonceSource};

mod error;
mod manager;
mod source;
