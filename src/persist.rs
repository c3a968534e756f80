//! Persisting execution results
//!
//! [`FilePersister`] writes timestamped files to local disk. Remote backends
//! such as [`EntityStore`](crate::entity::EntityStore) implement the same
//! [`ResponsePersister`] trait and report their own kind of location.

use crate::response::{is_json_content_type, ExecutionResult};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Where and how a result is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    pub dir: PathBuf,
    /// Prepended to the file name as `{prefix}_`
    pub prefix: Option<String>,
    pub include_headers: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./responses"),
            prefix: None,
            include_headers: true,
        }
    }
}

impl PersistOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn without_headers(mut self) -> Self {
        self.include_headers = false;
        self
    }

    fn file_path(&self, name: &str, timestamp: &str, extension: &str) -> PathBuf {
        let prefix = match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{}_", prefix),
            _ => String::new(),
        };
        self.dir
            .join(format!("{}{}_{}.{}", prefix, name, timestamp, extension))
    }
}

/// Stores execution results
#[async_trait]
pub trait ResponsePersister: Send + Sync {
    /// Where a stored result can be found again (a path, an entity key, ...)
    type Location: Send;

    /// Store the full record (metadata, body and payment receipt)
    async fn persist(
        &self,
        result: &ExecutionResult,
        name: &str,
        options: &PersistOptions,
    ) -> Result<Self::Location>;

    /// Store only the response body
    async fn persist_body(
        &self,
        result: &ExecutionResult,
        name: &str,
        options: &PersistOptions,
    ) -> Result<Self::Location>;
}

/// Record layout stored by every persister
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseRecord<'a> {
    timestamp: String,
    url: &'a str,
    status: u16,
    status_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<Map<String, Value>>,
    body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_info: Option<&'a Value>,
}

/// Writes timestamped JSON files under [`PersistOptions::dir`]
#[derive(Debug, Clone, Default)]
pub struct FilePersister;

impl FilePersister {
    pub fn new() -> Self {
        Self
    }

    async fn write(path: &Path, contents: String) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, contents).await?;
        Ok(())
    }
}

/// The JSON record of `result` as captured at `now`
pub(crate) fn response_record(
    result: &ExecutionResult,
    options: &PersistOptions,
    now: DateTime<Utc>,
) -> Result<Value> {
    let record = ResponseRecord {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        url: result.url.as_str(),
        status: result.status.as_u16(),
        status_text: result.status.canonical_reason().unwrap_or(""),
        headers: options.include_headers.then(|| header_map(result)),
        body: result.body.to_value(),
        payment_info: result.payment_receipt.as_ref().map(|receipt| &receipt.raw),
    };
    Ok(serde_json::to_value(record)?)
}

#[async_trait]
impl ResponsePersister for FilePersister {
    type Location = PathBuf;

    async fn persist(
        &self,
        result: &ExecutionResult,
        name: &str,
        options: &PersistOptions,
    ) -> Result<PathBuf> {
        let now = Utc::now();
        let record = response_record(result, options, now)?;

        let path = options.file_path(name, &file_timestamp(now), "json");
        Self::write(&path, serde_json::to_string_pretty(&record)?).await?;

        info!("Response saved to: {}", path.display());
        Ok(path)
    }

    async fn persist_body(
        &self,
        result: &ExecutionResult,
        name: &str,
        options: &PersistOptions,
    ) -> Result<PathBuf> {
        let (extension, contents) = if is_json_content_type(&result.headers) {
            ("json", serde_json::to_string_pretty(&result.body.to_value())?)
        } else {
            ("txt", result.body.to_display_string())
        };

        let path = options.file_path(name, &file_timestamp(Utc::now()), extension);
        Self::write(&path, contents).await?;

        info!("Response body saved to: {}", path.display());
        Ok(path)
    }
}

/// ISO-8601 with `:` and `.` replaced so it is safe in file names
fn file_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Response headers as a JSON object; repeated headers are joined with ", "
fn header_map(result: &ExecutionResult) -> Map<String, Value> {
    let mut map = Map::new();
    for name in result.headers.keys() {
        let values: Vec<String> = result
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        map.insert(name.as_str().to_string(), Value::String(values.join(", ")));
    }
    map
}
