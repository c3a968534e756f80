//! Save results to, and read them back from, a paid entity store
//!
//! ```text
//! cargo run --example entity_store                  # store the newest saved response
//! cargo run --example entity_store -- custom '<json>'
//! cargo run --example entity_store -- read <entity-key>
//! ```
//!
//! The store URL comes from `SPURO_API_URL`. Writes and reads are paid with
//! the wallet in `PRIVATE_KEY`.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::io::Stdout;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x402_fetch::entity::Attributes;
use x402_fetch::report::{AnnouncingSigner, Reporter};
use x402_fetch::{
    ClientConfig, EntityStore, PaidRequestExecutor, ResponseBody, StoredEntity, Wallet,
    WalletFactory,
};

/// Local index of stored entities, one file per key
const RECORDS_DIR: &str = "./entities";

type Store = EntityStore<AnnouncingSigner<Wallet, Stdout>>;
type Console = Reporter<Stdout>;
type DemoResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> DemoResult<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "x402_fetch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;
    let signer = AnnouncingSigner::stdout(WalletFactory::from_config(&config)?);
    let executor = PaidRequestExecutor::with_config(&config)?;
    let store = EntityStore::new(executor, signer, config.require_entity_store_url()?)?;

    let mut reporter = Reporter::stdout();
    reporter.section("x402 entity store")?;
    reporter.info("Account address", store.signer().inner().address_string())?;
    reporter.api_url("Store URL", config.require_entity_store_url()?)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("read") => {
            let key = args.get(1).ok_or("usage: entity_store read <entity-key>")?;
            read(&store, &mut reporter, key).await
        }
        Some("custom") => {
            let raw = args.get(1).ok_or("usage: entity_store custom <json>")?;
            let data: Value = serde_json::from_str(raw)?;
            let attributes = Attributes::from([("type".to_string(), "custom_data".to_string())]);
            let stored = store.create_entity(&data, &attributes).await?;
            report_stored(&mut reporter, &stored)
        }
        Some(other) => Err(format!("unknown command {:?}, expected read or custom", other).into()),
        None => save_latest(&store, &mut reporter, &config.responses_dir).await,
    }
}

async fn read(store: &Store, reporter: &mut Console, key: &str) -> DemoResult<()> {
    reporter.step(1, "Reading entity")?;
    let entity = store.read_entity(key).await?;

    reporter.info("Entity key", &entity.entity_key)?;
    if let Some(owner) = &entity.metadata.owner {
        reporter.info("Owner", owner)?;
    }
    if let Some(content_type) = &entity.metadata.content_type {
        reporter.info("Content type", content_type)?;
    }

    let body = match entity.json() {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Text(entity.text()),
    };
    reporter.response_body("Entity payload", &body, None)?;
    Ok(())
}

async fn save_latest(
    store: &Store,
    reporter: &mut Console,
    responses_dir: &Path,
) -> DemoResult<()> {
    reporter.step(1, "Finding the newest saved response")?;
    let path = newest_json_file(responses_dir)
        .await?
        .ok_or_else(|| format!("no saved responses in {}", responses_dir.display()))?;
    reporter.info("File", path.display())?;

    let data: Value = serde_json::from_str(&tokio::fs::read_to_string(&path).await?)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let attributes = Attributes::from([
        ("type".to_string(), "saved_response".to_string()),
        ("file".to_string(), file_name),
    ]);

    reporter.step(2, "Storing entity")?;
    let stored = store.create_entity(&data, &attributes).await?;
    report_stored(reporter, &stored)?;

    reporter.step(3, "Writing local record")?;
    let record = json!({
        "entity_key": stored.entity_key,
        "tx_hash": stored.tx_hash,
        "saved_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "url": stored.url.as_str(),
        "owner": store.signer().inner().address_string(),
        "source_file": path.display().to_string(),
    });
    let record_path = Path::new(RECORDS_DIR).join(format!("{}.json", stored.entity_key));
    tokio::fs::create_dir_all(RECORDS_DIR).await?;
    tokio::fs::write(&record_path, serde_json::to_string_pretty(&record)?).await?;
    reporter.success(&format!("Record saved to {}", record_path.display()))?;
    Ok(())
}

fn report_stored(reporter: &mut Console, stored: &StoredEntity) -> DemoResult<()> {
    if let Some(receipt) = &stored.payment_receipt {
        reporter.payment(receipt)?;
    }
    reporter.success("Entity stored")?;
    reporter.info("Entity key", &stored.entity_key)?;
    if let Some(tx_hash) = &stored.tx_hash {
        reporter.info("Transaction", tx_hash)?;
    }
    reporter.api_url("Read it at", stored.url.as_str())?;
    Ok(())
}

async fn newest_json_file(dir: &Path) -> DemoResult<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if newest.as_ref().map_or(true, |(latest, _)| modified > *latest) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}
