//! Reach a target API through a paying relay
//!
//! The relay answers 402 with its own price, then forwards the call to the
//! target once paid.
//!
//! ```text
//! cargo run --example relay_fetch -- <relay-url> <target-url> [GET|POST] [json-data]
//! ```

use reqwest::Method;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x402_fetch::report::{AnnouncingSigner, Reporter};
use x402_fetch::{
    ClientConfig, FilePersister, PaidRequestExecutor, PersistOptions, RequestSpec,
    ResponsePersister, WalletFactory,
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

    let usage = "usage: relay_fetch <relay-url> <target-url> [GET|POST] [json-data]";
    let mut args = std::env::args().skip(1);
    let relay_url = args.next().ok_or(usage)?;
    let target = args.next().ok_or(usage)?;
    let method = match args.next() {
        Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())?,
        None => Method::GET,
    };
    let data = args.next().map(|raw| serde_json::from_str(&raw)).transpose()?;

    let config = ClientConfig::from_env()?;
    let signer = AnnouncingSigner::stdout(WalletFactory::from_config(&config)?);
    let executor = PaidRequestExecutor::with_config(&config)?;

    let mut reporter = Reporter::stdout();
    reporter.section("x402 relay fetch")?;
    reporter.info("Account address", signer.inner().address_string())?;
    reporter.info("Network", &config.network)?;
    reporter.api_url("Relay URL", &relay_url)?;
    reporter.api_url("Target API", &target)?;

    let spec = RequestSpec::relay(&relay_url, &target, method, &config.network, data)?;

    reporter.step(1, "Calling relay, paying if required")?;
    let result = match executor.execute(&spec, &signer).await {
        Ok(result) => result,
        Err(e) => {
            reporter.error("Relay call failed", Some(&e))?;
            return Err(e.into());
        }
    };

    reporter.info("Response status", result.status)?;
    if let Some(receipt) = &result.payment_receipt {
        reporter.payment(receipt)?;
    } else if result.paid {
        reporter.info("Payment receipt", "none returned")?;
    }

    reporter.step(2, "Saving response")?;
    let options = PersistOptions::new(&config.responses_dir).with_prefix("relay");
    let saved = FilePersister::new().persist(&result, "target", &options).await?;
    reporter.success(&format!("Saved {}", saved.display()))?;

    reporter.response_body("Target response", &result.body, Some(&saved))?;
    Ok(())
}
