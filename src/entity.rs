//! Storing results with a paid entity storage service
//!
//! Entity stores keep small JSON documents on a blockchain-backed ledger and
//! charge for writes and reads through x402. Documents travel hex-encoded:
//!
//! - `POST {base}/entities` with `{payload, content_type, attributes, ttl}`
//!   answers `{entity_key, tx_hash}`
//! - `GET {base}/entities/{key}` answers `{entity: {owner, content_type}, data}`

use crate::client::PaidRequestExecutor;
use crate::persist::{response_record, PersistOptions, ResponsePersister};
use crate::response::ExecutionResult;
use crate::signer::Signer;
use crate::types::{PaymentReceipt, RequestSpec};
use crate::{Result, X402Error};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Entities live for a year unless told otherwise
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400 * 365);

/// Value of the `source` attribute attached to every entity
pub const DEFAULT_SOURCE: &str = "x402-fetch";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Entity attributes; the store only accepts string values
pub type Attributes = BTreeMap<String, String>;

/// Confirmation of a created entity
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub entity_key: String,
    /// Ledger transaction that created the entity
    pub tx_hash: Option<String>,
    /// Where the entity can be read back
    pub url: Url,
    /// Settlement receipt of the write, if one was charged
    pub payment_receipt: Option<PaymentReceipt>,
}

/// Metadata the store keeps alongside the payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EntityMetadata {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Attributes, expiry and anything else the store reports
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// An entity read back from the store, payload already hex-decoded
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedEntity {
    pub entity_key: String,
    pub metadata: EntityMetadata,
    pub data: Vec<u8>,
}

impl RetrievedEntity {
    /// Payload decoded lossily as UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Payload parsed as JSON
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.data)
            .map_err(|e| X402Error::body_parse(format!("entity payload is not JSON: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct CreateEntityResponse {
    entity_key: String,
    #[serde(default)]
    tx_hash: Option<String>,
}

#[derive(Deserialize)]
struct ReadEntityResponse {
    #[serde(default)]
    entity: EntityMetadata,
    data: String,
}

/// Client for an x402-paid entity store.
///
/// Every write and read goes through [`PaidRequestExecutor::execute`], so the
/// store's price is paid by `signer` whenever it answers 402.
#[derive(Debug, Clone)]
pub struct EntityStore<S> {
    executor: PaidRequestExecutor,
    signer: S,
    base_url: Url,
    ttl: Duration,
    source: String,
}

impl<S: Signer> EntityStore<S> {
    pub fn new(executor: PaidRequestExecutor, signer: S, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            X402Error::config(format!("Invalid entity store URL {}: {}", base_url, e))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(X402Error::config(format!(
                "Entity store URL must be an http(s) base URL: {}",
                base_url
            )));
        }

        Ok(Self {
            executor,
            signer,
            base_url,
            ttl: DEFAULT_TTL,
            source: DEFAULT_SOURCE.to_string(),
        })
    }

    /// How long the store keeps new entities
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Value recorded in the `source` attribute
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// URL an entity is read from
    pub fn entity_url(&self, entity_key: &str) -> Result<Url> {
        if entity_key.trim().is_empty() {
            return Err(X402Error::config("Entity key must not be empty"));
        }
        self.endpoint(&["entities", entity_key])
    }

    /// Store `data` as a new JSON entity.
    ///
    /// `saved_at` and `source` are added to `attributes`, replacing any
    /// caller-supplied values.
    pub async fn create_entity(
        &self,
        data: &Value,
        attributes: &Attributes,
    ) -> Result<StoredEntity> {
        let mut attributes = attributes.clone();
        attributes.insert(
            "saved_at".to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        attributes.insert("source".to_string(), self.source.clone());

        let request = json!({
            "payload": encode_payload(&serde_json::to_vec(data)?),
            "content_type": JSON_CONTENT_TYPE,
            "attributes": attributes,
            "ttl": self.ttl.as_secs(),
        });
        let url = self.endpoint(&["entities"])?;
        debug!("Creating entity at {}", url);

        let result = self
            .executor
            .execute(&RequestSpec::post_json(url.as_str(), request)?, &self.signer)
            .await?;
        let created: CreateEntityResponse = response_json(&result)?;

        info!(
            "Entity {} stored{}",
            created.entity_key,
            created
                .tx_hash
                .as_deref()
                .map(|tx| format!(" in {}", tx))
                .unwrap_or_default()
        );

        Ok(StoredEntity {
            url: self.entity_url(&created.entity_key)?,
            entity_key: created.entity_key,
            tx_hash: created.tx_hash,
            payment_receipt: result.payment_receipt,
        })
    }

    /// Read an entity back by key
    pub async fn read_entity(&self, entity_key: &str) -> Result<RetrievedEntity> {
        let url = self.entity_url(entity_key)?;
        debug!("Reading entity from {}", url);

        let result = self
            .executor
            .execute(&RequestSpec::get(url.as_str())?, &self.signer)
            .await?;
        let read: ReadEntityResponse = response_json(&result)?;

        Ok(RetrievedEntity {
            entity_key: entity_key.to_string(),
            metadata: read.entity,
            data: decode_payload(&read.data)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| X402Error::config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Attributes describing a persisted result
fn result_attributes(
    kind: &str,
    result: &ExecutionResult,
    name: &str,
    options: &PersistOptions,
) -> Attributes {
    let name = match options.prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() => format!("{}_{}", prefix, name),
        _ => name.to_string(),
    };
    Attributes::from([
        ("type".to_string(), kind.to_string()),
        ("name".to_string(), name),
        ("url".to_string(), result.url.to_string()),
        ("status".to_string(), result.status.as_u16().to_string()),
    ])
}

/// Results are stored as entities; [`PersistOptions::dir`] is not used
#[async_trait]
impl<S: Signer> ResponsePersister for EntityStore<S> {
    type Location = StoredEntity;

    async fn persist(
        &self,
        result: &ExecutionResult,
        name: &str,
        options: &PersistOptions,
    ) -> Result<StoredEntity> {
        let record = response_record(result, options, Utc::now())?;
        let attributes = result_attributes("response", result, name, options);
        self.create_entity(&record, &attributes).await
    }

    async fn persist_body(
        &self,
        result: &ExecutionResult,
        name: &str,
        options: &PersistOptions,
    ) -> Result<StoredEntity> {
        let attributes = result_attributes("response_body", result, name, options);
        self.create_entity(&result.body.to_value(), &attributes).await
    }
}

fn response_json<T: DeserializeOwned>(result: &ExecutionResult) -> Result<T> {
    match result.body.as_json() {
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            X402Error::body_parse(format!("unexpected entity store response: {}", e))
        }),
        None => Err(result
            .body_error()
            .unwrap_or_else(|| X402Error::body_parse("entity store did not answer with JSON"))),
    }
}

/// `0x`-prefixed lowercase hex
pub fn encode_payload(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Accepts hex with or without the `0x` prefix
pub fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let payload = payload.trim();
    let digits = payload.strip_prefix("0x").unwrap_or(payload);
    hex::decode(digits)
        .map_err(|e| X402Error::body_parse(format!("entity payload is not hex: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignerError;
    use crate::response::ResponseBody;
    use crate::signer::AuthorizationToken;
    use crate::types::PaymentRequirement;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    struct NoPayment;

    #[async_trait]
    impl Signer for NoPayment {
        async fn authorize(
            &self,
            _requirement: &PaymentRequirement,
        ) -> std::result::Result<AuthorizationToken, SignerError> {
            Err(SignerError::signing("not expected to pay"))
        }
    }

    fn store(base: &str) -> Result<EntityStore<NoPayment>> {
        EntityStore::new(PaidRequestExecutor::new()?, NoPayment, base)
    }

    fn result(body: ResponseBody) -> ExecutionResult {
        ExecutionResult {
            url: Url::parse("https://store.example.com/entities").unwrap(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
            payment_receipt: None,
            receipt_error: None,
            attempts: 1,
            paid: false,
        }
    }

    #[test]
    fn test_payload_hex() {
        assert_eq!(encode_payload(br#"{"a":1}"#), "0x7b2261223a317d");
        assert_eq!(decode_payload("0x7b2261223a317d").unwrap(), br#"{"a":1}"#);
        assert_eq!(decode_payload("7b7d").unwrap(), b"{}");
        assert!(matches!(
            decode_payload("0xzz"),
            Err(X402Error::BodyParse { .. })
        ));
    }

    #[test]
    fn test_entity_url_keeps_base_path() {
        let api_store = store("https://store.example.com/api/").unwrap();
        assert_eq!(
            api_store.entity_url("0xabc").unwrap().as_str(),
            "https://store.example.com/api/entities/0xabc"
        );
        let store = store("https://store.example.com").unwrap();
        assert_eq!(
            store.entity_url("a/b").unwrap().as_str(),
            "https://store.example.com/entities/a%2Fb"
        );
        assert!(store.entity_url(" ").is_err());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(matches!(store("not a url"), Err(X402Error::Config { .. })));
        assert!(matches!(
            store("mailto:someone@example.com"),
            Err(X402Error::Config { .. })
        ));
    }

    #[test]
    fn test_result_attributes_carry_prefixed_name() {
        let options = PersistOptions::default().with_prefix("demo");
        let attributes =
            result_attributes("response", &result(ResponseBody::Empty), "joke", &options);
        assert_eq!(attributes["type"], "response");
        assert_eq!(attributes["name"], "demo_joke");
        assert_eq!(attributes["status"], "200");
    }

    #[test]
    fn test_response_json_requires_json_body() {
        let created: CreateEntityResponse =
            response_json(&result(ResponseBody::Json(json!({"entity_key": "0x1"})))).unwrap();
        assert_eq!(created.entity_key, "0x1");
        assert!(created.tx_hash.is_none());

        let err = response_json::<CreateEntityResponse>(&result(ResponseBody::Text(
            "stored".into(),
        )))
        .unwrap_err();
        assert!(matches!(err, X402Error::BodyParse { .. }));
    }

    #[test]
    fn test_retrieved_entity_views() {
        let entity = RetrievedEntity {
            entity_key: "0x1".into(),
            metadata: EntityMetadata::default(),
            data: br#"{"summary":"ok"}"#.to_vec(),
        };
        assert_eq!(entity.json().unwrap()["summary"], "ok");
        assert_eq!(entity.text(), r#"{"summary":"ok"}"#);
    }
}
