//! Human-readable progress output for command-line tools

use crate::error::SignerError;
use crate::response::ResponseBody;
use crate::signer::{AuthorizationToken, Signer};
use crate::types::{networks, PaymentReceipt, PaymentRequirement, PaymentRequirements};
use crate::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Longest body printed before truncation
pub const MAX_CONSOLE_LENGTH: usize = 500;

/// Cut `text` to `max_chars` characters, appending `...` when shortened
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Render an atomic token amount in whole units, e.g. `10000` USDC → `0.01`
pub fn format_amount(atomic: &str, decimals: u32) -> Option<String> {
    let amount: Decimal = atomic.trim().parse().ok()?;
    let scaled = amount / Decimal::from(10u64.checked_pow(decimals)?);
    Some(scaled.normalize().to_string())
}

/// Writes progress lines to a terminal or any other sink
pub struct Reporter<W: Write> {
    out: W,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn section(&mut self, title: &str) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "=== {} ===", title)?;
        Ok(())
    }

    pub fn step(&mut self, number: u32, description: &str) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "[Step {}] {}", number, description)?;
        Ok(())
    }

    pub fn info(&mut self, label: &str, value: impl std::fmt::Display) -> Result<()> {
        writeln!(self.out, "{}: {}", label, value)?;
        Ok(())
    }

    pub fn success(&mut self, message: &str) -> Result<()> {
        writeln!(self.out, "✓ {}", message)?;
        Ok(())
    }

    pub fn error(&mut self, message: &str, cause: Option<&dyn std::error::Error>) -> Result<()> {
        writeln!(self.out, "✗ {}", message)?;
        if let Some(cause) = cause {
            writeln!(self.out, "  {}", cause)?;
        }
        Ok(())
    }

    pub fn api_url(&mut self, label: &str, url: &str) -> Result<()> {
        writeln!(self.out, "{}: {}", label, url)?;
        Ok(())
    }

    /// Describe a payment option before it is signed
    pub fn payment_offer(&mut self, offer: &PaymentRequirements) -> Result<()> {
        let amount = format_amount(&offer.max_amount_required, networks::USDC_DECIMALS)
            .unwrap_or_else(|| offer.max_amount_required.clone());
        self.info("Price", format!("{} on {}", amount, offer.network))?;
        self.info("Pay to", &offer.pay_to)?;
        if !offer.description.is_empty() {
            self.info("Description", &offer.description)?;
        }
        Ok(())
    }

    /// Print everything a 402 asked for
    pub fn payment_required(&mut self, requirement: &PaymentRequirement) -> Result<()> {
        self.section("Payment Required")?;
        if let Some(reason) = requirement.error_message() {
            self.info("Reason", reason)?;
        }
        match requirement.offers() {
            Ok(offers) => {
                for offer in &offers {
                    self.payment_offer(offer)?;
                }
            }
            Err(e) => self.error("Payment instructions could not be decoded", Some(&e))?,
        }
        Ok(())
    }

    /// Print the settlement receipt of a paid call
    pub fn payment(&mut self, receipt: &PaymentReceipt) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "=== Payment Executed ===")?;
        if let Some(amount) = &receipt.amount {
            self.info("Amount", amount)?;
        }
        if let Some(beneficiary) = &receipt.beneficiary {
            self.info("Beneficiary", beneficiary)?;
        }
        if let Some(transaction) = &receipt.transaction {
            self.info("Transaction", transaction)?;
        }
        if let Some(network) = &receipt.network {
            self.info("Network", network)?;
        }
        if let Some(payer) = &receipt.payer {
            self.info("Payer", payer)?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Print a response body, truncated, pointing at the saved copy if cut
    pub fn response_body(
        &mut self,
        label: &str,
        body: &ResponseBody,
        saved_path: Option<&Path>,
    ) -> Result<()> {
        let text = body.to_display_string();
        let truncated = truncate_text(&text, MAX_CONSOLE_LENGTH);

        writeln!(self.out)?;
        writeln!(self.out, "=== {} ===", label)?;
        writeln!(self.out, "{}", truncated)?;

        if truncated != text {
            writeln!(self.out)?;
            writeln!(
                self.out,
                "... (truncated, showing first {} characters)",
                MAX_CONSOLE_LENGTH
            )?;
            if let Some(path) = saved_path {
                writeln!(self.out, "Full response saved to: {}", path.display())?;
            }
        }
        writeln!(self.out)?;
        Ok(())
    }
}

/// Signer that prints the payment instructions before delegating to `inner`
pub struct AnnouncingSigner<S, W: Write> {
    inner: S,
    reporter: Mutex<Reporter<W>>,
}

impl<S> AnnouncingSigner<S, io::Stdout> {
    pub fn stdout(inner: S) -> Self {
        Self::new(inner, io::stdout())
    }
}

impl<S, W: Write> AnnouncingSigner<S, W> {
    pub fn new(inner: S, out: W) -> Self {
        Self {
            inner,
            reporter: Mutex::new(Reporter::new(out)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_parts(self) -> (S, W) {
        let reporter = self
            .reporter
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (self.inner, reporter.into_inner())
    }
}

#[async_trait]
impl<S, W> Signer for AnnouncingSigner<S, W>
where
    S: Signer,
    W: Write + Send,
{
    async fn authorize(
        &self,
        requirement: &PaymentRequirement,
    ) -> std::result::Result<AuthorizationToken, SignerError> {
        {
            let mut reporter = self.reporter.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = reporter.payment_required(requirement) {
                warn!("Could not print payment instructions: {}", e);
            }
        }
        self.inner.authorize(requirement).await
    }
}
