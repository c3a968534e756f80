//! Pay two sources at once, then pay a summarizer for a digest of both
//!
//! ```text
//! cargo run --example multi_source -- <relay-url> <flows-api> <news-api>
//! ```
//!
//! Both sources are reached through the relay concurrently. The summarizer is
//! `{LLM_SERVER}/chat` (default `http://localhost:3000`), called with the
//! `SERVER_API_KEY` header value.

use reqwest::Method;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x402_fetch::report::{AnnouncingSigner, Reporter};
use x402_fetch::{
    ClientConfig, ExecutionResult, FilePersister, PaidRequestExecutor, PersistOptions,
    RequestSpec, ResponsePersister, WalletFactory,
};

const DEFAULT_LLM_SERVER: &str = "http://localhost:3000";

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

    let usage = "usage: multi_source <relay-url> <flows-api> <news-api>";
    let mut args = std::env::args().skip(1);
    let relay_url = args.next().ok_or(usage)?;
    let flows_api = args.next().ok_or(usage)?;
    let news_api = args.next().ok_or(usage)?;
    let llm_server =
        std::env::var("LLM_SERVER").unwrap_or_else(|_| DEFAULT_LLM_SERVER.to_string());
    let api_key = std::env::var("SERVER_API_KEY").unwrap_or_default();

    let config = ClientConfig::from_env()?;
    let signer = AnnouncingSigner::stdout(WalletFactory::from_config(&config)?);
    let executor = PaidRequestExecutor::with_config(&config)?;
    let persister = FilePersister::new();
    let options = PersistOptions::new(&config.responses_dir).with_prefix("multi");

    let mut reporter = Reporter::stdout();
    reporter.section("x402 multi-source digest")?;
    reporter.info("Account address", signer.inner().address_string())?;
    reporter.api_url("Relay URL", &relay_url)?;

    reporter.step(1, "Fetching both sources")?;
    let flows_spec = RequestSpec::relay(
        &relay_url,
        &flows_api,
        Method::POST,
        &config.network,
        Some(json!({"pagination": {"page": 1, "per_page": 10}})),
    )?;
    let news_spec = RequestSpec::relay(
        &relay_url,
        &news_api,
        Method::POST,
        &config.network,
        Some(json!({"limit": 5, "time_filter": "past_week"})),
    )?;
    let (flows, news) = tokio::join!(
        executor.execute(&flows_spec, &signer),
        executor.execute(&news_spec, &signer),
    );

    let mut sources = Vec::new();
    for (name, outcome) in [("flows", flows), ("news", news)] {
        match outcome {
            Ok(result) => {
                report_source(&mut reporter, name, &result)?;
                persister.persist(&result, name, &options).await?;
                sources.push((name, result.body.to_value()));
            }
            Err(e) => reporter.error(&format!("Source {} failed", name), Some(&e))?,
        }
    }
    if sources.is_empty() {
        return Err("no source answered".into());
    }

    reporter.step(2, "Summarizing")?;
    let mut prompt = String::from("Summarize the following data and highlight key trends:\n");
    for (name, data) in &sources {
        prompt.push_str(&format!("\n{}:\n{}\n", name, serde_json::to_string_pretty(data)?));
    }
    let chat_url = format!("{}/chat", llm_server.trim_end_matches('/'));
    reporter.api_url("Calling", &chat_url)?;
    let chat_spec = RequestSpec::builder(Method::POST, &chat_url)
        .header("x-api-key", &api_key)
        .json(json!({
            "messages": [
                {"role": "system", "content": "You are a concise market analyst."},
                {"role": "user", "content": prompt}
            ]
        }))
        .build()?;
    let summary = executor.execute(&chat_spec, &signer).await?;
    report_source(&mut reporter, "summary", &summary)?;
    let saved = persister.persist(&summary, "summary", &options).await?;

    let digest: Value = json!({
        "sources": sources.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
        "summary": summary.body.to_value(),
    });
    reporter.success(&format!("Saved {}", saved.display()))?;
    reporter.response_body(
        "Digest",
        &x402_fetch::ResponseBody::Json(digest),
        Some(&saved),
    )?;
    Ok(())
}

fn report_source(
    reporter: &mut Reporter<std::io::Stdout>,
    name: &str,
    result: &ExecutionResult,
) -> x402_fetch::Result<()> {
    reporter.info(&format!("{} status", name), result.status)?;
    if let Some(receipt) = &result.payment_receipt {
        reporter.payment(receipt)?;
    }
    if let Some(e) = result.body_error() {
        reporter.error(&format!("{} body did not parse", name), Some(&e))?;
    }
    Ok(())
}
