//! Category commands.

use anyhow::Result;

use super::{confirm, CategoryArgs, CategoryCommand};
use crate::context::Context;

/// Run the category command.
pub async fn run(args: CategoryArgs, ctx: &Context) -> Result<()> {
    match args.command {
        Some(CategoryCommand::List) | None => list_categories(ctx).await,
        Some(CategoryCommand::Reset { yes }) => reset_categories(yes, ctx).await,
    }
}

async fn list_categories(ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let categories = session.market.category_info()?;
    session.flush()?;

    if ctx.output.is_json() {
        let names: Vec<&str> = categories.iter().map(|(id, _)| id.as_str()).collect();
        ctx.output.json(&names);
        return Ok(());
    }

    ctx.output.header("Categories");
    for (_, label) in &categories {
        ctx.output.list_item(label);
    }
    Ok(())
}

async fn reset_categories(yes: bool, ctx: &Context) -> Result<()> {
    if !confirm("Delete all categories and rebuild the tree?", yes)? {
        ctx.output.info("Cancelled");
        return Ok(());
    }

    let session = ctx.open()?;
    let removed = session.market.delete_categories()?;
    let created = session.market.build_all_categories()?;
    session.flush()?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "removed": removed, "created": created }));
        return Ok(());
    }
    ctx.output.success(&format!("Removed {} and built {} categories", removed, created));
    Ok(())
}
