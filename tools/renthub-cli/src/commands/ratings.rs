//! Rating index maintenance commands.

use std::time::Duration;

use anyhow::Result;
use renthub_market::rating::{AuditReport, ReindexOutcome, SweepReport};
use renthub_market::{MarketError, ProductId};

use super::{RatingsArgs, RatingsCommand};
use crate::context::Context;

/// Run the ratings command.
pub async fn run(args: RatingsArgs, ctx: &Context) -> Result<()> {
    match args.command {
        RatingsCommand::Sweep { watch: None } => sweep_once(ctx),
        RatingsCommand::Sweep { watch: Some(secs) } => sweep_watch(secs, ctx).await,
        RatingsCommand::Reindex { pid } => reindex(&pid, ctx).await,
        RatingsCommand::Audit { mark_dirty } => audit(mark_dirty, ctx).await,
    }
}

fn sweep_once(ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let spinner = ctx.output.spinner("Sweeping dirty products...");
    let result = session.market.sweep_dirty_products();
    spinner.finish_and_clear();
    session.flush()?;

    let report = result?;
    print_sweep(&report, ctx);
    Ok(())
}

/// Sweep every `secs` seconds until interrupted.
///
/// A reconciliation gap is reported and the loop carries on; the next
/// audit with `--mark-dirty` picks those products up again.
async fn sweep_watch(secs: u64, ctx: &Context) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    ctx.output.info(&format!("Sweeping every {}s; press Ctrl-C to stop", secs.max(1)));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match sweep_once(ctx) {
                    Ok(()) => {}
                    Err(e) => match e.downcast_ref::<MarketError>() {
                        Some(MarketError::IndexReconciliationGap { products, .. }) => {
                            ctx.output.error(&format!(
                                "{} product(s) left stale in the search index: {}",
                                products.len(),
                                products.join(", ")
                            ));
                        }
                        _ => return Err(e),
                    },
                }
            }
            _ = tokio::signal::ctrl_c() => {
                ctx.output.info("Stopped");
                return Ok(());
            }
        }
    }
}

fn print_sweep(report: &SweepReport, ctx: &Context) {
    if ctx.output.is_json() {
        ctx.output.json(report);
        return;
    }
    if report.examined == 0 {
        ctx.output.info("No products awaiting reindex");
        return;
    }
    ctx.output.success(&format!("Reindexed {} product(s)", report.reindexed));
    ctx.output.kv("examined", &report.examined.to_string());
    ctx.output.kv("skipped", &report.skipped.to_string());
    if report.missing_documents > 0 {
        ctx.output.warn(&format!("{} product(s) have no search document", report.missing_documents));
    }
    if report.failed > 0 {
        ctx.output.warn(&format!("{} product(s) left for the next sweep", report.failed));
    }
}

async fn reindex(pid: &str, ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let outcome = session.market.reindex_product_rating(&ProductId::new(pid))?;
    session.flush()?;

    let label = match outcome {
        ReindexOutcome::Reindexed => "reindexed",
        ReindexOutcome::MissingProduct => "missing_product",
        ReindexOutcome::MissingDocument => "missing_document",
    };
    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "pid": pid, "outcome": label }));
        return Ok(());
    }
    match outcome {
        ReindexOutcome::Reindexed => ctx.output.success(&format!("Reindexed product {}", pid)),
        ReindexOutcome::MissingProduct => ctx.output.warn(&format!("Product {} not found", pid)),
        ReindexOutcome::MissingDocument => {
            ctx.output.warn(&format!("Product {} has no search document", pid))
        }
    }
    Ok(())
}

async fn audit(mark_dirty: bool, ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let spinner = ctx.output.spinner("Auditing search index ratings...");
    let result = session.market.audit_rating_index(mark_dirty);
    spinner.finish_and_clear();
    let report = result?;
    session.flush()?;

    print_audit(&report, ctx);
    Ok(())
}

fn print_audit(report: &AuditReport, ctx: &Context) {
    if ctx.output.is_json() {
        ctx.output.json(report);
        return;
    }

    ctx.output.header("Rating index audit");
    ctx.output.kv("examined", &report.examined.to_string());
    ctx.output.kv("in flight", &report.in_flight.to_string());

    if report.is_consistent() {
        ctx.output.success("Search index ratings agree with stored ratings");
        return;
    }

    for pid in &report.missing_documents {
        ctx.output.warn(&format!("{}: no search document", pid));
    }
    if !report.disagreements.is_empty() {
        ctx.output.table_row(&["PRODUCT", "STORED", "INDEXED"], &[24, 8, 8]);
        for d in &report.disagreements {
            let indexed = d
                .indexed
                .map(|r| format!("{:.4}", r))
                .unwrap_or_else(|| "-".to_string());
            ctx.output
                .table_row(&[d.pid.as_str(), &format!("{:.4}", d.stored), &indexed], &[24, 8, 8]);
        }
    }
    if report.marked_dirty > 0 {
        ctx.output.info(&format!(
            "Flagged {} product(s); run `renthub ratings sweep` to repair",
            report.marked_dirty
        ));
    }
}
