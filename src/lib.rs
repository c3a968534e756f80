//! # x402-fetch - pay-on-402 HTTP calls
//!
//! A client for calling HTTP APIs guarded by the x402 micropayment protocol.
//! [`PaidRequestExecutor`] sends a request, and when the resource answers
//! `402 Payment Required` it asks a [`Signer`] for a payment authorization,
//! retries once with the authorization attached and decodes the settlement
//! receipt. Results can be written to disk with [`persist::FilePersister`],
//! stored with a paid entity service through [`entity::EntityStore`] and
//! printed with [`report::Reporter`].

pub mod client;
pub mod config;
pub mod crypto;
pub mod entity;
pub mod error;
pub mod persist;
pub mod report;
pub mod response;
pub mod retry;
pub mod signer;
pub mod types;
pub mod wallet;

// Re-exports for convenience
pub use client::PaidRequestExecutor;
pub use config::ClientConfig;
pub use entity::{EntityStore, RetrievedEntity, StoredEntity};
pub use error::{NetworkCause, Result, SignerError, X402Error};
pub use persist::{FilePersister, PersistOptions, ResponsePersister};
pub use response::{ExecutionResult, ResponseBody};
pub use retry::RetryPolicy;
pub use signer::{AuthorizationToken, Signer};
pub use types::*;
pub use wallet::{Wallet, WalletFactory};

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert_eq!(X402_VERSION, 1);
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_payment_requirements_creation() {
        let requirements = PaymentRequirements::new(
            "exact",
            "base-sepolia",
            "1000000",
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
        );

        assert_eq!(requirements.scheme, "exact");
        assert_eq!(requirements.network, "base-sepolia");
        assert_eq!(requirements.max_amount_required, "1000000");
        assert_eq!(requirements.max_timeout_seconds, 60);
        assert!(requirements.token_domain().is_none());
    }

    #[test]
    fn test_executor_and_signer_are_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<PaidRequestExecutor>();

        fn assert_signer<S: Signer>() {}
        assert_signer::<Wallet>();
        assert_signer::<std::sync::Arc<Wallet>>();
    }
}
