//! Wallet signer for the x402 "exact" EVM scheme
//!
//! The wallet answers a 402 by signing an EIP-3009 `TransferWithAuthorization`
//! for the first offered payment option on its own network, and hands the
//! result back as an `X-PAYMENT` header.

use crate::{
    config::{normalize_private_key, ClientConfig},
    crypto::{eip712, signature},
    error::SignerError,
    signer::{AuthorizationToken, Signer},
    types::{
        networks, schemes, ExactEvmPayload, ExactEvmPayloadAuthorization, PaymentPayload,
        PaymentRequirement, PaymentRequirements,
    },
    Result, X402Error,
};
use async_trait::async_trait;
use ethereum_types::{Address, U256};
use std::str::FromStr;

/// Seconds of clock skew tolerated before `validAfter`
const VALID_AFTER_LEEWAY_SECS: i64 = 60;

/// Wallet implementation for x402 payments
pub struct Wallet {
    private_key: String,
    address: Address,
    network: String,
    max_payment: Option<U256>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("network", &self.network)
            .field("max_payment", &self.max_payment)
            .finish()
    }
}

impl Wallet {
    /// Create a wallet paying on `network` with the given hex private key
    pub fn new(private_key: &str, network: &str) -> std::result::Result<Self, SignerError> {
        let private_key = normalize_private_key(private_key);
        let address = signature::address_from_private_key(&private_key)?;
        Ok(Self {
            private_key,
            address,
            network: network.to_string(),
            max_payment: None,
        })
    }

    /// Refuse to sign any single payment above `max_payment` atomic units
    pub fn with_max_payment(mut self, max_payment: u128) -> Self {
        self.max_payment = Some(U256::from(max_payment));
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The account address as 0x-prefixed hex
    pub fn address_string(&self) -> String {
        format!("{:?}", self.address)
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Pick the first "exact" option offered on this wallet's network
    pub fn select_requirement<'a>(
        &self,
        offers: &'a [PaymentRequirements],
    ) -> std::result::Result<&'a PaymentRequirements, SignerError> {
        offers
            .iter()
            .find(|offer| offer.scheme == schemes::EXACT && offer.network == self.network)
            .ok_or_else(|| {
                let offered: Vec<String> = offers
                    .iter()
                    .map(|offer| format!("{}/{}", offer.scheme, offer.network))
                    .collect();
                SignerError::no_acceptable_requirement(format!(
                    "wallet pays with {}/{}, server accepts [{}]",
                    schemes::EXACT,
                    self.network,
                    offered.join(", ")
                ))
            })
    }

    /// Create a payment payload with an EIP-712 signature
    pub fn create_signed_payment_payload(
        &self,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<PaymentPayload, SignerError> {
        let value = U256::from_dec_str(&requirements.max_amount_required).map_err(|_| {
            SignerError::signing(format!(
                "Invalid amount: {}",
                requirements.max_amount_required
            ))
        })?;

        if let Some(cap) = self.max_payment {
            if value > cap {
                return Err(SignerError::InsufficientFunds {
                    required: value.to_string(),
                    available: cap.to_string(),
                });
            }
        }

        let to = Address::from_str(&requirements.pay_to)
            .map_err(|_| SignerError::signing("Invalid payTo address"))?;
        let domain = self.domain(requirements)?;

        let now = chrono::Utc::now().timestamp();
        let valid_after = now - VALID_AFTER_LEEWAY_SECS;
        let valid_before = now + i64::from(requirements.max_timeout_seconds);
        let nonce = signature::generate_nonce();

        let message = eip712::TransferWithAuthorization {
            from: self.address,
            to,
            value,
            valid_after: U256::from(valid_after as u64),
            valid_before: U256::from(valid_before as u64),
            nonce,
        };

        let hash = message.signing_hash(&domain);
        let signature = signature::sign_hash(hash, &self.private_key)?;

        if signature::recover_address(hash, &signature)? != self.address {
            return Err(SignerError::signing(
                "Generated signature verification failed",
            ));
        }

        let authorization = ExactEvmPayloadAuthorization {
            from: self.address_string(),
            to: requirements.pay_to.clone(),
            value: value.to_string(),
            valid_after: valid_after.to_string(),
            valid_before: valid_before.to_string(),
            nonce: format!("{:?}", nonce),
        };

        Ok(PaymentPayload::new(
            &requirements.scheme,
            &requirements.network,
            ExactEvmPayload {
                signature,
                authorization,
            },
        ))
    }

    /// EIP-712 domain of the token named by `requirements`
    fn domain(
        &self,
        requirements: &PaymentRequirements,
    ) -> std::result::Result<eip712::Domain, SignerError> {
        let network = networks::get(&requirements.network).ok_or_else(|| {
            SignerError::no_acceptable_requirement(format!(
                "Unsupported network: {}",
                requirements.network
            ))
        })?;

        let asset = if requirements.asset.is_empty() {
            network.usdc_contract
        } else {
            requirements.asset.as_str()
        };
        let verifying_contract = Address::from_str(asset)
            .map_err(|_| SignerError::signing(format!("Invalid asset address: {}", asset)))?;

        let (name, version) = requirements.token_domain().unwrap_or(if network.is_testnet {
            ("USDC", "2")
        } else {
            ("USD Coin", "2")
        });

        Ok(eip712::Domain {
            name: name.to_string(),
            version: version.to_string(),
            chain_id: network.chain_id,
            verifying_contract,
        })
    }
}

#[async_trait]
impl Signer for Wallet {
    async fn authorize(
        &self,
        requirement: &PaymentRequirement,
    ) -> std::result::Result<AuthorizationToken, SignerError> {
        let offers = requirement
            .offers()
            .map_err(|e| SignerError::no_acceptable_requirement(e.to_string()))?;
        let selected = self.select_requirement(&offers)?;

        let payload = self.create_signed_payment_payload(selected)?;
        let encoded = payload
            .to_base64()
            .map_err(|e| SignerError::signing(e.to_string()))?;

        tracing::info!(
            "Authorized {} atomic units to {} on {}",
            selected.max_amount_required,
            selected.pay_to,
            selected.network
        );

        Ok(AuthorizationToken::x_payment(encoded))
    }
}

/// Wallet factory for creating wallets from different sources
pub struct WalletFactory;

impl WalletFactory {
    /// Create wallet from private key string
    pub fn from_private_key(private_key: &str, network: &str) -> Result<Wallet> {
        let private_key = normalize_private_key(private_key);
        if private_key.len() != 66 {
            return Err(X402Error::config(
                "Invalid private key format. Must be 64 hex characters",
            ));
        }
        hex::decode(&private_key[2..])
            .map_err(|_| X402Error::config("Invalid hex in private key"))?;

        Ok(Wallet::new(&private_key, network)?)
    }

    /// Create wallet from environment variable
    pub fn from_env(private_key_env: &str, network: &str) -> Result<Wallet> {
        let private_key = std::env::var(private_key_env).map_err(|_| {
            X402Error::config(format!(
                "Environment variable {} not found",
                private_key_env
            ))
        })?;

        Self::from_private_key(&private_key, network)
    }

    /// Create wallet from a loaded client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Wallet> {
        let private_key = config
            .private_key
            .as_deref()
            .ok_or_else(|| X402Error::config("PRIVATE_KEY is not set"))?;

        let wallet = Self::from_private_key(private_key, &config.network)?;
        Ok(match config.max_payment {
            Some(cap) => wallet.with_max_payment(cap),
            None => wallet,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::eip712::TransferWithAuthorization;
    use serde_json::json;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

    fn requirement(network: &str, amount: &str) -> PaymentRequirement {
        PaymentRequirement::new(json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [{
                "scheme": "exact",
                "network": network,
                "maxAmountRequired": amount,
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                "payTo": PAY_TO,
                "resource": "https://example.com/joke",
                "description": "A joke",
                "maxTimeoutSeconds": 60,
                "extra": {"name": "USDC", "version": "2"}
            }]
        }))
    }

    #[test]
    fn test_wallet_factory_valid_key() {
        let wallet = WalletFactory::from_private_key(TEST_KEY, "base-sepolia").unwrap();
        assert_eq!(wallet.network(), "base-sepolia");
        assert_eq!(
            wallet.address_string(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_wallet_factory_edge_cases() {
        assert!(WalletFactory::from_private_key("", "base").is_err());
        assert!(WalletFactory::from_private_key("0x123", "base").is_err());
        assert!(WalletFactory::from_private_key(
            "0xgggggggggggggggggggggggggggggggggggggggggggggggggggggggggggggggg",
            "base"
        )
        .is_err());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let wallet = WalletFactory::from_private_key(TEST_KEY, "base").unwrap();
        assert!(!format!("{:?}", wallet).contains(TEST_KEY));
    }

    #[tokio::test]
    async fn test_authorize_produces_verifiable_payload() {
        let wallet = WalletFactory::from_private_key(TEST_KEY, "base-sepolia").unwrap();
        let token = wallet
            .authorize(&requirement("base-sepolia", "10000"))
            .await
            .unwrap();

        assert_eq!(token.header_name, "x-payment");
        let payload = PaymentPayload::from_base64(&token.value).unwrap();
        assert_eq!(payload.scheme, "exact");
        assert_eq!(payload.network, "base-sepolia");

        let auth = &payload.payload.authorization;
        assert_eq!(auth.value, "10000");
        assert_eq!(auth.from, wallet.address_string());

        let message = TransferWithAuthorization {
            from: Address::from_str(&auth.from).unwrap(),
            to: Address::from_str(&auth.to).unwrap(),
            value: U256::from_dec_str(&auth.value).unwrap(),
            valid_after: U256::from_dec_str(&auth.valid_after).unwrap(),
            valid_before: U256::from_dec_str(&auth.valid_before).unwrap(),
            nonce: ethereum_types::H256::from_str(&auth.nonce).unwrap(),
        };
        let domain = eip712::Domain {
            name: "USDC".to_string(),
            version: "2".to_string(),
            chain_id: 84532,
            verifying_contract: Address::from_str("0x036CbD53842c5426634e7929541eC2318f3dCF7e")
                .unwrap(),
        };
        let recovered =
            signature::recover_address(message.signing_hash(&domain), &payload.payload.signature)
                .unwrap();
        assert_eq!(recovered, wallet.address());
    }

    #[tokio::test]
    async fn test_authorize_rejects_other_networks() {
        let wallet = WalletFactory::from_private_key(TEST_KEY, "base").unwrap();
        let err = wallet
            .authorize(&requirement("avalanche", "10000"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::NoAcceptableRequirement { .. }));
    }

    #[tokio::test]
    async fn test_authorize_enforces_spending_cap() {
        let wallet = WalletFactory::from_private_key(TEST_KEY, "base-sepolia")
            .unwrap()
            .with_max_payment(5_000);
        let err = wallet
            .authorize(&requirement("base-sepolia", "10000"))
            .await
            .unwrap_err();
        match err {
            SignerError::InsufficientFunds {
                required,
                available,
            } => {
                assert_eq!(required, "10000");
                assert_eq!(available, "5000");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_authorizations_use_distinct_nonces() {
        let wallet = WalletFactory::from_private_key(TEST_KEY, "base-sepolia").unwrap();
        let requirement = requirement("base-sepolia", "10000");
        let (a, b) = tokio::join!(wallet.authorize(&requirement), wallet.authorize(&requirement));

        let a = PaymentPayload::from_base64(&a.unwrap().value).unwrap();
        let b = PaymentPayload::from_base64(&b.unwrap().value).unwrap();
        assert_ne!(a.payload.authorization.nonce, b.payload.authorization.nonce);
    }

    #[test]
    fn test_from_config_requires_key() {
        assert!(WalletFactory::from_config(&ClientConfig::default()).is_err());

        let config = ClientConfig::default()
            .with_private_key(TEST_KEY)
            .with_max_payment(1);
        let wallet = WalletFactory::from_config(&config).unwrap();
        assert_eq!(wallet.network(), "base");
    }
}
