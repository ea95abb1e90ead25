//! Payment notification processing.

use std::collections::BTreeMap;

use anyhow::{bail, Context as _, Result};
use renthub_market::payment::{IpnMessage, IpnOutcome, StaticVerifier, VerificationStatus};

use super::{IpnArgs, VerifyStatus};
use crate::context::Context;

/// Run the ipn command.
pub async fn run(args: IpnArgs, ctx: &Context) -> Result<()> {
    let body = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read notification: {}", args.file))?;
    let message = IpnMessage::from_params(parse_params(&body)?)?;

    let verifier = StaticVerifier(match args.status {
        VerifyStatus::Verified => VerificationStatus::Verified,
        VerifyStatus::Invalid => VerificationStatus::Invalid,
    });

    let session = ctx.open()?;
    ctx.output.debug(&format!("verifying against {}", ctx.config.payments.verify_url()));
    let outcome = session.market.handle_ipn(message, &verifier)?;
    session.flush()?;

    match outcome {
        IpnOutcome::Recorded(record) => {
            if ctx.output.is_json() {
                ctx.output.json(&record);
                return Ok(());
            }
            ctx.output.success(&format!("Recorded payment {}", record.txn_id));
            ctx.output.kv("status", &record.payment_status);
            ctx.output.kv("amount", &record.amount.to_string());
            ctx.output.kv("verified", &record.verified.to_string());
        }
        IpnOutcome::Duplicate => {
            if ctx.output.is_json() {
                ctx.output.json(&serde_json::json!({ "outcome": "duplicate" }));
                return Ok(());
            }
            ctx.output.info("Notification already processed");
        }
        IpnOutcome::Rejected { reason } => {
            if ctx.output.is_json() {
                ctx.output.json(&serde_json::json!({ "outcome": "rejected", "reason": reason }));
                return Ok(());
            }
            ctx.output.warn(&format!("Notification rejected: {}", reason));
        }
    }
    Ok(())
}

/// Parse a notification body: a JSON object or `key=value` pairs joined
/// by `&` or newlines, form-encoded.
fn parse_params(body: &str) -> Result<BTreeMap<String, String>> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).context("Failed to parse JSON notification");
    }

    let mut params = BTreeMap::new();
    for pair in trimmed.split(|c: char| c == '&' || c == '\n').map(str::trim) {
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Malformed notification field: {}", pair);
        };
        params.insert(form_decode(key)?, form_decode(value)?);
    }
    Ok(params)
}

fn form_decode(s: &str) -> Result<String> {
    let mut bytes = Vec::with_capacity(s.len());
    let mut iter = s.bytes();
    while let Some(b) = iter.next() {
        match b {
            b'+' => bytes.push(b' '),
            b'%' => {
                let hex: Vec<u8> = iter.by_ref().take(2).collect();
                let decoded = std::str::from_utf8(&hex)
                    .ok()
                    .filter(|h| h.len() == 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match decoded {
                    Some(byte) => bytes.push(byte),
                    None => bail!("Invalid percent escape in '{}'", s),
                }
            }
            _ => bytes.push(b),
        }
    }
    String::from_utf8(bytes).context("Notification is not valid UTF-8")
}
