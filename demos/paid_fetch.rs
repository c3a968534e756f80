//! Call an x402-protected URL, paying with the wallet in `PRIVATE_KEY`
//!
//! ```text
//! cargo run --example paid_fetch -- <url> [name] [json-body]
//! ```
//!
//! With a JSON body the request is sent as POST, otherwise GET.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x402_fetch::report::{AnnouncingSigner, Reporter};
use x402_fetch::{
    config::ENV_MAX_ATTEMPTS, ClientConfig, FilePersister, PaidRequestExecutor, PersistOptions,
    RequestSpec, ResponsePersister, WalletFactory,
};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "x402_fetch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .ok_or("usage: paid_fetch <url> [name] [json-body]")?;
    let name = args.next().unwrap_or_else(|| "response".to_string());
    let body = args.next().map(|raw| serde_json::from_str(&raw)).transpose()?;

    let config = ClientConfig::from_env()?;
    let signer = AnnouncingSigner::stdout(WalletFactory::from_config(&config)?);
    let executor = PaidRequestExecutor::with_config(&config)?;

    let mut reporter = Reporter::stdout();
    reporter.section("x402 paid fetch")?;
    reporter.info("Account address", signer.inner().address_string())?;
    reporter.info("Network", signer.inner().network())?;
    reporter.api_url("Calling", &url)?;

    let spec = match body {
        Some(body) => RequestSpec::post_json(&url, body)?,
        None => RequestSpec::get(&url)?,
    };

    reporter.step(1, "Requesting resource, paying if required")?;
    let result = match executor.execute(&spec, &signer).await {
        Ok(result) => result,
        Err(e) => {
            reporter.error("Request failed", Some(&e))?;
            if e.network_cause().is_some_and(|cause| cause.is_transient()) {
                let hint = format!("upstream kept timing out; retry or raise {}", ENV_MAX_ATTEMPTS);
                reporter.info("Hint", hint)?;
            }
            return Err(e.into());
        }
    };

    reporter.info("Response status", result.status)?;
    reporter.info("Attempts", result.attempts)?;
    if let Some(receipt) = &result.payment_receipt {
        reporter.payment(receipt)?;
    }
    if let Some(e) = &result.receipt_error {
        reporter.error("Payment receipt could not be decoded", Some(e))?;
    }

    reporter.step(2, "Saving response")?;
    let options = PersistOptions::new(&config.responses_dir);
    let persister = FilePersister::new();
    let saved = persister.persist(&result, &name, &options).await?;
    let body_path = persister.persist_body(&result, &name, &options).await?;
    reporter.success(&format!("Saved {} and {}", saved.display(), body_path.display()))?;

    reporter.response_body("Response body", &result.body, Some(&saved))?;
    Ok(())
}
