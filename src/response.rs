//! Response classification and the outcome of a paid request

use crate::types::PaymentReceipt;
use crate::X402Error;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

/// A response body classified by its declared content type
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `application/json` (or `+json`) body that parsed
    Json(Value),
    /// Any other content type, decoded lossily as UTF-8
    Text(String),
    /// Zero-length body
    Empty,
    /// Declared JSON that failed to parse; the raw text is kept
    Malformed { raw: String, error: String },
}

impl ResponseBody {
    /// Classify raw bytes according to the response headers
    pub fn classify(headers: &HeaderMap, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        if is_json_content_type(headers) {
            match serde_json::from_slice(bytes) {
                Ok(value) => Self::Json(value),
                Err(e) => Self::Malformed {
                    raw: String::from_utf8_lossy(bytes).into_owned(),
                    error: e.to_string(),
                },
            }
        } else {
            Self::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// The parse failure, if the body was declared JSON but malformed
    pub fn parse_error(&self) -> Option<X402Error> {
        match self {
            Self::Malformed { error, .. } => Some(X402Error::body_parse(error.clone())),
            _ => None,
        }
    }

    /// JSON rendition used for persistence and display
    pub fn to_value(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
            Self::Empty => Value::Null,
            Self::Malformed { raw, error } => {
                Value::String(format!("Error reading body: {}\n{}", error, raw))
            }
        }
    }

    /// Human-readable rendition used for console output
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Self::Text(text) => text.clone(),
            Self::Empty => String::new(),
            Self::Malformed { raw, .. } => raw.clone(),
        }
    }
}

/// Whether the headers declare a JSON body
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            essence == "application/json" || essence.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Final outcome of one logical call.
///
/// Carries a [`PaymentReceipt`] only when a 402 was observed, the paid retry
/// succeeded and the response had a payment-response header that decoded.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Final URL after redirects
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub payment_receipt: Option<PaymentReceipt>,
    /// Set when the payment-response header was present but malformed
    pub receipt_error: Option<X402Error>,
    /// Network sends performed, including transient-failure retries
    pub attempts: u32,
    /// Whether a payment authorization was attached
    pub paid: bool,
}

impl ExecutionResult {
    /// The body parse failure, if any
    pub fn body_error(&self) -> Option<X402Error> {
        self.body.parse_error()
    }

    /// Look up a response header as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn headers_with(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_classify_json() {
        let body = ResponseBody::classify(
            &headers_with("application/json; charset=utf-8"),
            br#"{"ok":true}"#,
        );
        assert_eq!(body, ResponseBody::Json(json!({"ok": true})));

        let problem = ResponseBody::classify(
            &headers_with("application/problem+json"),
            br#"{"title":"x"}"#,
        );
        assert!(problem.is_json());
    }

    #[test]
    fn test_classify_malformed_json_keeps_raw() {
        let body = ResponseBody::classify(&headers_with("application/json"), b"{not json");
        match &body {
            ResponseBody::Malformed { raw, .. } => assert_eq!(raw, "{not json"),
            other => panic!("expected malformed, got {:?}", other),
        }
        assert!(matches!(body.parse_error(), Some(X402Error::BodyParse { .. })));
    }

    #[test]
    fn test_classify_text_and_empty() {
        assert_eq!(
            ResponseBody::classify(&headers_with("text/plain"), b"hello"),
            ResponseBody::Text("hello".into())
        );
        assert_eq!(
            ResponseBody::classify(&HeaderMap::new(), br#"{"ok":true}"#),
            ResponseBody::Text(r#"{"ok":true}"#.into())
        );
        assert_eq!(
            ResponseBody::classify(&headers_with("application/json"), b""),
            ResponseBody::Empty
        );
    }

    #[test]
    fn test_to_value() {
        assert_eq!(ResponseBody::Empty.to_value(), Value::Null);
        assert_eq!(ResponseBody::Text("hi".into()).to_value(), json!("hi"));
        let malformed = ResponseBody::Malformed {
            raw: "{".into(),
            error: "EOF".into(),
        };
        assert!(malformed
            .to_value()
            .as_str()
            .unwrap()
            .starts_with("Error reading body"));
    }
}
