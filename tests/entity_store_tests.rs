//! Integration tests for paid entity storage

use async_trait::async_trait;
use base64::Engine;
use mockito::{Matcher, Server, ServerGuard};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use x402_fetch::entity::{decode_payload, encode_payload, Attributes};
use x402_fetch::{
    AuthorizationToken, EntityStore, ExecutionResult, PaidRequestExecutor, PaymentRequirement,
    PersistOptions, ResponseBody, ResponsePersister, RetryPolicy, Signer, SignerError, X402Error,
};

#[derive(Default)]
struct CountingSigner {
    calls: AtomicUsize,
}

#[async_trait]
impl Signer for CountingSigner {
    async fn authorize(
        &self,
        _requirement: &PaymentRequirement,
    ) -> Result<AuthorizationToken, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AuthorizationToken::x_payment("store-authorization"))
    }
}

fn store(server: &ServerGuard) -> EntityStore<CountingSigner> {
    let executor = PaidRequestExecutor::new()
        .unwrap()
        .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)));
    EntityStore::new(executor, CountingSigner::default(), &server.url())
        .unwrap()
        .with_ttl(Duration::from_secs(3600))
}

fn price() -> String {
    json!({
        "x402Version": 1,
        "error": "X-PAYMENT header is required",
        "accepts": [{
            "scheme": "exact",
            "network": "base",
            "maxAmountRequired": "1000",
            "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "maxTimeoutSeconds": 60
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_create_entity_pays_and_sends_hex_payload() {
    let mut server = Server::new_async().await;
    let data = json!({"summary": "smart money is accumulating"});
    let payload = encode_payload(&serde_json::to_vec(&data).unwrap());

    let unpaid = server
        .mock("POST", "/entities")
        .match_header("x-payment", Matcher::Missing)
        .with_status(402)
        .with_header("content-type", "application/json")
        .with_body(price())
        .expect(1)
        .create_async()
        .await;
    let receipt = base64::engine::general_purpose::STANDARD
        .encode(r#"{"success":true,"transaction":"0xpaid"}"#);
    let paid = server
        .mock("POST", "/entities")
        .match_header("x-payment", "store-authorization")
        .match_body(Matcher::PartialJson(json!({
            "payload": payload,
            "content_type": "application/json",
            "ttl": 3600,
            "attributes": {"type": "custom_data", "source": "x402-fetch"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("x-payment-response", &receipt)
        .with_body(r#"{"entity_key":"0xkey","tx_hash":"0xtx"}"#)
        .expect(1)
        .create_async()
        .await;

    let store = store(&server);
    let attributes = Attributes::from([("type".to_string(), "custom_data".to_string())]);
    let stored = store.create_entity(&data, &attributes).await.unwrap();

    unpaid.assert_async().await;
    paid.assert_async().await;
    assert_eq!(store.signer().calls.load(Ordering::SeqCst), 1);
    assert_eq!(stored.entity_key, "0xkey");
    assert_eq!(stored.tx_hash.as_deref(), Some("0xtx"));
    assert_eq!(
        stored.url.as_str(),
        format!("{}/entities/0xkey", server.url())
    );
    assert_eq!(
        stored.payment_receipt.unwrap().transaction.as_deref(),
        Some("0xpaid")
    );
}

#[tokio::test]
async fn test_read_entity_decodes_payload() {
    let mut server = Server::new_async().await;
    let data = json!({"summary": "hello"});

    let _unpaid = server
        .mock("GET", "/entities/0xkey")
        .match_header("x-payment", Matcher::Missing)
        .with_status(402)
        .with_body(price())
        .create_async()
        .await;
    let paid = server
        .mock("GET", "/entities/0xkey")
        .match_header("x-payment", "store-authorization")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "entity": {
                    "owner": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
                    "content_type": "application/json",
                    "expires_at": 123
                },
                "data": encode_payload(data.to_string().as_bytes()),
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let store = store(&server);
    let entity = store.read_entity("0xkey").await.unwrap();

    paid.assert_async().await;
    assert_eq!(store.signer().calls.load(Ordering::SeqCst), 1);
    assert_eq!(entity.entity_key, "0xkey");
    assert_eq!(
        entity.metadata.owner.as_deref(),
        Some("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
    );
    assert_eq!(entity.metadata.content_type.as_deref(), Some("application/json"));
    assert_eq!(entity.metadata.other["expires_at"], 123);
    assert_eq!(entity.json().unwrap(), data);
}

#[tokio::test]
async fn test_read_entity_rejects_non_hex_payload() {
    let mut server = Server::new_async().await;
    let _free = server
        .mock("GET", "/entities/0xkey")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"entity":{},"data":"not hex"}"#)
        .create_async()
        .await;

    let store = store(&server);
    let err = store.read_entity("0xkey").await.unwrap_err();

    assert!(matches!(err, X402Error::BodyParse { .. }));
    assert_eq!(store.signer().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_store_errors_surface_as_upstream() {
    let mut server = Server::new_async().await;
    let _missing = server
        .mock("GET", "/entities/0xgone")
        .with_status(404)
        .with_body("entity not found")
        .create_async()
        .await;

    let err = store(&server).read_entity("0xgone").await.unwrap_err();
    match err {
        X402Error::Upstream { status, body } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, "entity not found");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_persist_stores_response_record_as_entity() {
    let mut server = Server::new_async().await;
    let created = server
        .mock("POST", "/entities")
        .match_body(Matcher::PartialJson(json!({
            "content_type": "application/json",
            "attributes": {
                "type": "response",
                "name": "demo_joke",
                "status": "200",
                "url": "https://api.example.com/joke"
            }
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"entity_key":"0xrecord"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let result = ExecutionResult {
        url: url::Url::parse("https://api.example.com/joke").unwrap(),
        status: StatusCode::OK,
        headers,
        body: ResponseBody::Json(json!({"joke": "why did the chain fork"})),
        payment_receipt: None,
        receipt_error: None,
        attempts: 2,
        paid: true,
    };

    let options = PersistOptions::default().with_prefix("demo");
    let stored = store(&server)
        .persist(&result, "joke", &options)
        .await
        .unwrap();

    created.assert_async().await;
    assert_eq!(stored.entity_key, "0xrecord");
    assert!(stored.tx_hash.is_none());
    assert!(stored.payment_receipt.is_none());
}

#[test]
fn test_payload_encoding_is_reversible_for_records() {
    let record = json!({"url": "https://api.example.com", "status": 200});
    let encoded = encode_payload(&serde_json::to_vec(&record).unwrap());
    assert!(encoded.starts_with("0x"));
    let decoded: Value = serde_json::from_slice(&decode_payload(&encoded).unwrap()).unwrap();
    assert_eq!(decoded, record);
}
