//! HTTP client that pays for x402-protected resources

use crate::config::ClientConfig;
use crate::error::{NetworkCause, SignerError};
use crate::response::{ExecutionResult, ResponseBody};
use crate::retry::RetryPolicy;
use crate::signer::{AuthorizationToken, Signer};
use crate::types::{headers, PaymentReceipt, PaymentRequirement, RequestBody, RequestSpec};
use crate::{Result, X402Error};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

/// A response read to completion within one attempt
#[derive(Debug)]
struct Fetched {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

/// Executes requests against x402-protected endpoints.
///
/// The executor holds no per-call state; clones share the connection pool and
/// can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct PaidRequestExecutor {
    client: Client,
    retry: RetryPolicy,
}

impl PaidRequestExecutor {
    /// Create an executor with default timeout and retry policy
    pub fn new() -> Result<Self> {
        Self::with_config(&ClientConfig::default())
    }

    /// Create an executor from a client configuration
    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            retry: config.retry_policy(),
        })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Execute `spec`, paying through `signer` if the resource answers 402.
    ///
    /// At most one payment cycle happens per call: the signer is invoked once
    /// per 402 observed, and a paid retry that is refused with another 402 is a
    /// protocol error. Transient failures of the paid send are retried with the
    /// same authorization, so a server that does not deduplicate payments may
    /// charge twice; callers needing exactly-once payment must supply their own
    /// idempotency keys in `spec`.
    pub async fn execute<S>(&self, spec: &RequestSpec, signer: &S) -> Result<ExecutionResult>
    where
        S: Signer + ?Sized,
    {
        let mut attempts = 0;

        debug!("Sending unpaid request: {} {}", spec.method(), spec.url());
        let unpaid = self.send_with_retry(spec, None, &mut attempts).await?;

        if unpaid.status != StatusCode::PAYMENT_REQUIRED {
            return finish(unpaid, attempts, false);
        }

        let requirement = payment_requirement(&unpaid)?;
        info!(
            "Payment required for {}{}",
            spec.url(),
            requirement
                .error_message()
                .map(|reason| format!(": {}", reason))
                .unwrap_or_default()
        );

        let token = signer.authorize(&requirement).await?;
        let authorization = payment_header(&token)?;

        debug!("Retrying {} with {}", spec.url(), token.header_name);
        let paid = self
            .send_with_retry(spec, Some(&authorization), &mut attempts)
            .await?;

        if paid.status == StatusCode::PAYMENT_REQUIRED {
            let reason = PaymentRequirement::from_slice(&paid.body)
                .ok()
                .and_then(|r| r.error_message().map(str::to_string))
                .unwrap_or_else(|| "no reason given".to_string());
            return Err(X402Error::protocol(format!(
                "Payment was not accepted by {}: {}",
                paid.url, reason
            )));
        }

        finish(paid, attempts, true)
    }

    /// Execute a request that is expected to be free.
    ///
    /// A 402 answer is reported as a protocol error instead of being paid.
    pub async fn execute_unpaid(&self, spec: &RequestSpec) -> Result<ExecutionResult> {
        let mut attempts = 0;
        let fetched = self.send_with_retry(spec, None, &mut attempts).await?;
        if fetched.status == StatusCode::PAYMENT_REQUIRED {
            return Err(X402Error::protocol(format!(
                "{} requires payment but no signer was supplied",
                fetched.url
            )));
        }
        finish(fetched, attempts, false)
    }

    async fn send_with_retry(
        &self,
        spec: &RequestSpec,
        payment: Option<&(HeaderName, HeaderValue)>,
        attempts: &mut u32,
    ) -> Result<Fetched> {
        let mut delays = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                delays.push(delay);
                tokio::time::sleep(delay).await;
            }
            *attempts += 1;

            let cause = match self.send_once(spec, payment).await {
                Ok(fetched) if self.retry.is_transient_status(fetched.status) => {
                    NetworkCause::UpstreamTimeout {
                        status: fetched.status,
                    }
                }
                Ok(fetched) => return Ok(fetched),
                Err(cause) => cause,
            };

            if !cause.is_transient() || !self.retry.allows_retry_after(attempt) {
                return Err(X402Error::Network {
                    cause,
                    attempts: *attempts,
                    delays,
                });
            }

            warn!(
                "Attempt {}/{} to {} failed ({}), retrying in {:?}",
                attempt,
                self.retry.max_attempts,
                spec.url(),
                cause,
                self.retry.delay_before(attempt + 1)
            );
        }
    }

    async fn send_once(
        &self,
        spec: &RequestSpec,
        payment: Option<&(HeaderName, HeaderValue)>,
    ) -> std::result::Result<Fetched, NetworkCause> {
        let mut request = self
            .client
            .request(spec.method().clone(), spec.url().clone())
            .headers(spec.headers().clone());

        request = match spec.body() {
            Some(RequestBody::Bytes(bytes)) => request.body(bytes.clone()),
            Some(RequestBody::Json(value)) => request.json(value),
            None => request,
        };

        if let Some((name, value)) = payment {
            request = request.header(name.clone(), value.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkCause::from_reqwest(&e))?;

        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkCause::from_reqwest(&e))?
            .to_vec();

        debug!("{} answered {} ({} bytes)", url, status, body.len());

        Ok(Fetched {
            url,
            status,
            headers,
            body,
        })
    }
}

/// Extract the payment requirement from a 402 response.
///
/// x402 v1 servers put it in the body; v2 servers send it base64-encoded in
/// `PAYMENT-REQUIRED` and may leave the body empty.
fn payment_requirement(fetched: &Fetched) -> Result<PaymentRequirement> {
    let from_body = PaymentRequirement::from_slice(&fetched.body);
    if from_body.is_ok() {
        return from_body;
    }

    match fetched
        .headers
        .get(headers::PAYMENT_REQUIRED)
        .and_then(|v| v.to_str().ok())
    {
        Some(header) => PaymentRequirement::from_header(header),
        None => from_body,
    }
}

fn payment_header(token: &AuthorizationToken) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(token.header_name.as_bytes()).map_err(|_| {
        SignerError::signing(format!("Invalid authorization header name: {}", token.header_name))
    })?;
    let value = HeaderValue::from_str(&token.value)
        .map_err(|_| SignerError::signing("Authorization value is not a valid header value"))?;
    Ok((name, value))
}

fn finish(fetched: Fetched, attempts: u32, paid: bool) -> Result<ExecutionResult> {
    if fetched.status.is_client_error() || fetched.status.is_server_error() {
        return Err(X402Error::Upstream {
            status: fetched.status,
            body: String::from_utf8_lossy(&fetched.body).into_owned(),
        });
    }

    let body = ResponseBody::classify(&fetched.headers, &fetched.body);
    if let ResponseBody::Malformed { error, .. } = &body {
        warn!("{} declared JSON but the body did not parse: {}", fetched.url, error);
    }

    let (payment_receipt, receipt_error) = if paid {
        decode_receipt(&fetched.headers)
    } else {
        (None, None)
    };

    if let Some(receipt) = &payment_receipt {
        info!(
            "Payment settled{}",
            receipt
                .transaction
                .as_deref()
                .map(|tx| format!(": {}", tx))
                .unwrap_or_default()
        );
    }

    Ok(ExecutionResult {
        url: fetched.url,
        status: fetched.status,
        headers: fetched.headers,
        body,
        payment_receipt,
        receipt_error,
        attempts,
        paid,
    })
}

fn decode_receipt(response_headers: &HeaderMap) -> (Option<PaymentReceipt>, Option<X402Error>) {
    let header = response_headers
        .get(headers::X_PAYMENT_RESPONSE)
        .or_else(|| response_headers.get(headers::PAYMENT_RESPONSE));

    let Some(header) = header else {
        return (None, None);
    };

    let decoded = header
        .to_str()
        .map_err(|_| X402Error::receipt_decode("header is not visible ASCII"))
        .and_then(PaymentReceipt::from_header);

    match decoded {
        Ok(receipt) => (Some(receipt), None),
        Err(e) => {
            warn!("Could not decode payment receipt: {}", e);
            (None, Some(e))
        }
    }
}
