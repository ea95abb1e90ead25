//! Administrative commands.

use anyhow::Result;

use super::{confirm, AdminArgs, AdminCommand};
use crate::context::Context;

/// Run the admin command.
pub async fn run(args: AdminArgs, ctx: &Context) -> Result<()> {
    match args.command {
        AdminCommand::DeleteData { yes, deferred } => delete_data(yes, deferred, ctx).await,
    }
}

async fn delete_data(yes: bool, deferred: bool, ctx: &Context) -> Result<()> {
    ctx.output
        .warn("This deletes every category, product, review and search document.");
    if !confirm("Delete all marketplace data?", yes)? {
        ctx.output.info("Cancelled");
        return Ok(());
    }

    let session = ctx.open()?;

    if deferred {
        let id = session.market.request_delete_all();
        session.flush()?;
        if ctx.output.is_json() {
            ctx.output.json(&serde_json::json!({ "task_id": id }));
            return Ok(());
        }
        ctx.output.success(&format!("Queued as task {}; run `renthub tasks run`", id));
        return Ok(());
    }

    let spinner = ctx.output.spinner("Deleting data...");
    let result = session.market.delete_all_data();
    spinner.finish_and_clear();
    let summary = result?;
    session.flush()?;

    if ctx.output.is_json() {
        ctx.output.json(&summary);
        return Ok(());
    }
    ctx.output.success("Deleted all marketplace data");
    ctx.output.kv("categories", &summary.categories.to_string());
    ctx.output.kv("products", &summary.products.to_string());
    ctx.output.kv("reviews", &summary.reviews.to_string());
    ctx.output.kv("documents", &summary.documents.to_string());
    Ok(())
}
