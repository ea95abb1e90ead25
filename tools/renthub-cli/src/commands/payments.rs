//! Payment record commands.

use anyhow::Result;
use renthub_market::UserId;

use super::{confirm, PaymentsArgs, PaymentsCommand};
use crate::context::Context;

/// Run the payments command.
pub async fn run(args: PaymentsArgs, ctx: &Context) -> Result<()> {
    match args.command {
        PaymentsCommand::List { user } => list_payments(&user, ctx).await,
        PaymentsCommand::Clear { yes } => clear_payments(yes, ctx).await,
    }
}

async fn list_payments(user: &str, ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let records = session.market.transactions_for_user(&UserId::new(user))?;

    if ctx.output.is_json() {
        ctx.output.json(&records);
        return Ok(());
    }
    if records.is_empty() {
        ctx.output.info(&format!("No payments for user {}", user));
        return Ok(());
    }

    ctx.output.table_row(&["RECEIVED", "TXN", "STATUS", "AMOUNT", "PAYER"], &[20, 20, 10, 12, 30]);
    for record in &records {
        ctx.output.table_row(
            &[
                &record.received_at.format("%Y-%m-%d %H:%M").to_string(),
                &record.txn_id,
                &record.payment_status,
                &record.amount.to_string(),
                &record.payer_email,
            ],
            &[20, 20, 10, 12, 30],
        );
    }
    Ok(())
}

async fn clear_payments(yes: bool, ctx: &Context) -> Result<()> {
    if !confirm("Delete every payment record?", yes)? {
        ctx.output.info("Cancelled");
        return Ok(());
    }

    let session = ctx.open()?;
    let removed = session.market.delete_all_transactions()?;
    session.flush()?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "removed": removed }));
        return Ok(());
    }
    ctx.output.success(&format!("Deleted {} payment record(s)", removed));
    Ok(())
}
