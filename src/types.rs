//! Core types for paid requests

use crate::{Result, X402Error};
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// x402 protocol version
pub const X402_VERSION: u32 = 1;

/// Header names used on the wire
pub mod headers {
    /// Payment authorization attached to the paid request (x402 v1)
    pub const X_PAYMENT: &str = "x-payment";
    /// Settlement confirmation on the paid response (x402 v1)
    pub const X_PAYMENT_RESPONSE: &str = "x-payment-response";
    /// Payment requirement carried as a header (x402 v2)
    pub const PAYMENT_REQUIRED: &str = "payment-required";
    /// Settlement confirmation on the paid response (x402 v2)
    pub const PAYMENT_RESPONSE: &str = "payment-response";
}

/// Body of an outgoing request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Raw bytes sent as-is
    Bytes(Vec<u8>),
    /// Structured payload serialized as JSON
    Json(Value),
}

/// A single logical call: target, method, headers and optional body.
///
/// Built once through [`RequestSpec::builder`] and never mutated afterwards, so
/// the same spec can be replayed for the unpaid send, the paid retry and any
/// transient-failure retries.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
}

impl RequestSpec {
    /// Start building a request
    pub fn builder(method: Method, url: &str) -> RequestSpecBuilder {
        RequestSpecBuilder::new(method, url)
    }

    /// A GET request without headers or body
    pub fn get(url: &str) -> Result<Self> {
        Self::builder(Method::GET, url).build()
    }

    /// A POST request carrying a JSON body
    pub fn post_json(url: &str, body: Value) -> Result<Self> {
        Self::builder(Method::POST, url).json(body).build()
    }

    /// A request to a relay that pays on `network` and forwards to `target`.
    ///
    /// The relay is an opaque remote endpoint; this only builds its envelope.
    pub fn relay(
        relay_url: &str,
        target: &str,
        method: Method,
        network: &str,
        data: Option<Value>,
    ) -> Result<Self> {
        let mut envelope = serde_json::json!({
            "api_url": target,
            "method": method.as_str(),
            "network": network,
        });
        if let Some(data) = data {
            envelope["data"] = data;
        }
        Self::builder(Method::POST, relay_url).json(envelope).build()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }
}

/// Builder for [`RequestSpec`]; the first invalid input is reported by `build`
#[derive(Debug)]
pub struct RequestSpecBuilder {
    method: Method,
    url: std::result::Result<Url, String>,
    headers: HeaderMap,
    body: Option<RequestBody>,
    error: Option<String>,
}

impl RequestSpecBuilder {
    fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: Url::parse(url).map_err(|e| format!("Invalid URL {}: {}", url, e)),
            headers: HeaderMap::new(),
            body: None,
            error: None,
        }
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            (Err(_), _) => self.error = Some(format!("Invalid header name: {}", name)),
            (_, Err(_)) => self.error = Some(format!("Invalid value for header {}", name)),
        }
        self
    }

    /// Set a raw body
    pub fn bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    /// Set a JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Finish the request
    pub fn build(self) -> Result<RequestSpec> {
        if let Some(message) = self.error {
            return Err(X402Error::config(message));
        }
        let url = self.url.map_err(X402Error::config)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(X402Error::config(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        Ok(RequestSpec {
            method: self.method,
            url,
            headers: self.headers,
            body: self.body,
        })
    }
}

/// Payment instructions carried by a 402 response.
///
/// Kept as opaque JSON: the executor never interprets it and hands it to the
/// signer untouched. [`PaymentRequirement::offers`] decodes the x402 `accepts`
/// list for signers that understand it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentRequirement(Value);

impl PaymentRequirement {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Parse a 402 response body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let raw: Value = serde_json::from_slice(body)
            .map_err(|e| X402Error::protocol(format!("402 body is not valid JSON: {}", e)))?;
        Ok(Self(raw))
    }

    /// Decode the base64 `PAYMENT-REQUIRED` header of x402 v2 servers
    pub fn from_header(header: &str) -> Result<Self> {
        let decoded = decode_base64_lenient(header.trim()).map_err(|e| {
            X402Error::protocol(format!("PAYMENT-REQUIRED header is not base64: {}", e))
        })?;
        Self::from_slice(&decoded)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Protocol version announced by the server, if any
    pub fn x402_version(&self) -> Option<u32> {
        self.0
            .get("x402Version")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Human-readable reason the server gave for requiring payment
    pub fn error_message(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    /// Decode the `accepts` list into typed payment options.
    ///
    /// A document without `accepts` is treated as a single option.
    pub fn offers(&self) -> Result<Vec<PaymentRequirements>> {
        match self.0.get("accepts") {
            Some(Value::Array(accepts)) => accepts
                .iter()
                .map(|offer| serde_json::from_value(offer.clone()).map_err(X402Error::from))
                .collect(),
            Some(_) => Err(X402Error::protocol("`accepts` must be an array")),
            None => Ok(vec![serde_json::from_value(self.0.clone())?]),
        }
    }
}

/// One payment option offered by a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequirements {
    /// Payment scheme identifier (e.g., "exact")
    pub scheme: String,
    /// Blockchain network identifier (e.g., "base", "base-sepolia")
    pub network: String,
    /// Required payment amount in atomic token units
    #[serde(rename = "maxAmountRequired", alias = "amount")]
    pub max_amount_required: String,
    /// Token contract address
    #[serde(default)]
    pub asset: String,
    /// Recipient wallet address for the payment
    #[serde(rename = "payTo")]
    pub pay_to: String,
    /// URL of the protected resource
    #[serde(default)]
    pub resource: String,
    /// Human-readable description of the resource
    #[serde(default)]
    pub description: String,
    /// MIME type of the expected response
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Maximum time allowed for payment completion in seconds
    #[serde(rename = "maxTimeoutSeconds", default = "default_max_timeout")]
    pub max_timeout_seconds: u32,
    /// Scheme-specific additional information (EIP-712 token name and version)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

fn default_max_timeout() -> u32 {
    60
}

impl PaymentRequirements {
    /// Create a new payment requirements instance
    pub fn new(
        scheme: impl Into<String>,
        network: impl Into<String>,
        max_amount_required: impl Into<String>,
        asset: impl Into<String>,
        pay_to: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            network: network.into(),
            max_amount_required: max_amount_required.into(),
            asset: asset.into(),
            pay_to: pay_to.into(),
            resource: String::new(),
            description: String::new(),
            mime_type: None,
            max_timeout_seconds: default_max_timeout(),
            extra: None,
        }
    }

    /// Get the amount as a decimal
    pub fn amount_as_decimal(&self) -> Result<Decimal> {
        self.max_amount_required.parse().map_err(|_| {
            X402Error::protocol(format!("Invalid amount: {}", self.max_amount_required))
        })
    }

    /// Get the amount in decimal units (e.g., 0.01 for 10000 atomic USDC)
    pub fn amount_in_decimal_units(&self, decimals: u32) -> Result<Decimal> {
        let amount = self.amount_as_decimal()?;
        Ok(amount / Decimal::from(10u64.pow(decimals)))
    }

    /// EIP-712 token name and version from `extra`, if the server provided them
    pub fn token_domain(&self) -> Option<(&str, &str)> {
        let extra = self.extra.as_ref()?;
        Some((extra.get("name")?.as_str()?, extra.get("version")?.as_str()?))
    }
}

/// Payment payload for client payment authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPayload {
    /// Protocol version identifier
    #[serde(rename = "x402Version")]
    pub x402_version: u32,
    /// Payment scheme identifier
    pub scheme: String,
    /// Blockchain network identifier
    pub network: String,
    /// Payment data object
    pub payload: ExactEvmPayload,
}

impl PaymentPayload {
    /// Create a new payment payload
    pub fn new(
        scheme: impl Into<String>,
        network: impl Into<String>,
        payload: ExactEvmPayload,
    ) -> Self {
        Self {
            x402_version: X402_VERSION,
            scheme: scheme.into(),
            network: network.into(),
            payload,
        }
    }

    /// Decode a base64-encoded payment payload
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = general_purpose::STANDARD.decode(encoded)?;
        Ok(serde_json::from_slice(&decoded)?)
    }

    /// Encode the payment payload to base64
    pub fn to_base64(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }
}

/// Exact EVM payment payload (EIP-3009)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactEvmPayload {
    /// EIP-712 signature for authorization
    pub signature: String,
    /// EIP-3009 authorization parameters
    pub authorization: ExactEvmPayloadAuthorization,
}

/// EIP-3009 authorization parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactEvmPayloadAuthorization {
    pub from: String,
    pub to: String,
    /// Payment amount in atomic units
    pub value: String,
    #[serde(rename = "validAfter")]
    pub valid_after: String,
    #[serde(rename = "validBefore")]
    pub valid_before: String,
    /// 32-byte random nonce, 0x-prefixed hex
    pub nonce: String,
}

/// Settlement confirmation returned in the payment-response header.
///
/// x402 facilitators report `success`, `transaction`, `network` and `payer`;
/// relays add `amount` and `beneficiary`. Every field is optional and the
/// undecoded document is kept in `raw`. Fields are read leniently: amounts may
/// be numbers and the transaction hash may appear under several names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<String>,
    /// Transaction hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl PaymentReceipt {
    /// Decode a base64 JSON payment-response header value
    pub fn from_header(header: &str) -> Result<Self> {
        let decoded = decode_base64_lenient(header.trim())
            .map_err(|e| X402Error::receipt_decode(format!("not base64: {}", e)))?;
        let raw: Value = serde_json::from_slice(&decoded)
            .map_err(|e| X402Error::receipt_decode(format!("not JSON: {}", e)))?;
        if !raw.is_object() {
            return Err(X402Error::receipt_decode("expected a JSON object"));
        }
        Ok(Self::from_value(raw))
    }

    /// Read the known fields out of a decoded receipt document
    pub fn from_value(raw: Value) -> Self {
        let field = |name: &str| raw.get(name).and_then(scalar_string);
        Self {
            success: raw.get("success").and_then(Value::as_bool),
            amount: field("amount"),
            beneficiary: field("beneficiary"),
            transaction: ["transaction", "txHash", "tx_hash"]
                .into_iter()
                .find_map(field),
            network: field("network"),
            payer: field("payer"),
            raw,
        }
    }

    /// Encode the receipt the way a server would send it
    pub fn to_header(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Servers disagree on the base64 alphabet; accept standard and URL-safe forms
fn decode_base64_lenient(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD
        .decode(input)
        .or_else(|err| general_purpose::URL_SAFE_NO_PAD.decode(input).map_err(|_| err))
}

/// Network configuration with chain-specific details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: &'static str,
    pub chain_id: u64,
    pub usdc_contract: &'static str,
    pub is_testnet: bool,
}

/// Supported networks
pub mod networks {
    use super::NetworkConfig;

    pub const BASE_MAINNET: &str = "base";
    pub const BASE_SEPOLIA: &str = "base-sepolia";
    pub const AVALANCHE_MAINNET: &str = "avalanche";
    pub const AVALANCHE_FUJI: &str = "avalanche-fuji";

    /// USDC uses 6 decimals on every supported network
    pub const USDC_DECIMALS: u32 = 6;

    static TABLE: [NetworkConfig; 4] = [
        NetworkConfig {
            name: BASE_MAINNET,
            chain_id: 8453,
            usdc_contract: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            is_testnet: false,
        },
        NetworkConfig {
            name: BASE_SEPOLIA,
            chain_id: 84532,
            usdc_contract: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            is_testnet: true,
        },
        NetworkConfig {
            name: AVALANCHE_MAINNET,
            chain_id: 43114,
            usdc_contract: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
            is_testnet: false,
        },
        NetworkConfig {
            name: AVALANCHE_FUJI,
            chain_id: 43113,
            usdc_contract: "0x5425890298aed601595a70AB815c96711a31Bc65",
            is_testnet: true,
        },
    ];

    /// Look up a network by its x402 name
    pub fn get(name: &str) -> Option<&'static NetworkConfig> {
        TABLE.iter().find(|config| config.name == name)
    }

    /// Check if a network is supported
    pub fn is_supported(name: &str) -> bool {
        get(name).is_some()
    }

    /// Get all supported network names
    pub fn all_supported() -> Vec<&'static str> {
        TABLE.iter().map(|config| config.name).collect()
    }
}

/// Common payment schemes
pub mod schemes {
    /// Exact payment scheme (EIP-3009)
    pub const EXACT: &str = "exact";
}
