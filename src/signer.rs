//! The payment signing capability handed to the executor

use crate::error::SignerError;
use crate::types::{headers, PaymentRequirement};
use async_trait::async_trait;
use std::sync::Arc;

/// A signed payment authorization, ready to attach to the paid request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationToken {
    /// Header carrying the authorization (`X-PAYMENT` for x402 v1)
    pub header_name: String,
    pub value: String,
}

impl AuthorizationToken {
    pub fn new(header_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
            value: value.into(),
        }
    }

    /// A token carried in the x402 v1 `X-PAYMENT` header
    pub fn x_payment(value: impl Into<String>) -> Self {
        Self::new(headers::X_PAYMENT, value)
    }
}

/// Produces payment authorizations for one account on one network.
///
/// Implementations may be invoked by several in-flight calls at once and must
/// not race on internal state such as nonce counters.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Build an authorization satisfying `requirement`
    async fn authorize(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<AuthorizationToken, SignerError>;
}

#[async_trait]
impl<S> Signer for Arc<S>
where
    S: Signer + ?Sized,
{
    async fn authorize(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<AuthorizationToken, SignerError> {
        (**self).authorize(requirement).await
    }
}

#[async_trait]
impl<S> Signer for Box<S>
where
    S: Signer + ?Sized,
{
    async fn authorize(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<AuthorizationToken, SignerError> {
        (**self).authorize(requirement).await
    }
}
