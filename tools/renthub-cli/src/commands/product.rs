//! Listing commands.

use anyhow::{bail, Result};
use renthub_market::catalog::Product;
use renthub_market::ProductId;
use renthub_search::fields;

use super::{confirm, ProductArgs, ProductCommand};
use crate::context::Context;
use crate::output::{flag_badge, format_rating};

/// Run the product command.
pub async fn run(args: ProductArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ProductCommand::Create { pid, fields } => {
            let session = ctx.open()?;
            let product = session.market.create_product(fields.into_params(pid))?;
            session.flush()?;

            if ctx.output.is_json() {
                ctx.output.json(&product);
                return Ok(());
            }
            ctx.output.success(&format!("Created product {}", product.id));
            print_product(&product, ctx);
            Ok(())
        }
        ProductCommand::Update { pid, fields } => {
            let session = ctx.open()?;
            let product = session
                .market
                .update_product(&ProductId::new(pid.as_str()), fields.into_params(Some(pid)))?;
            session.flush()?;

            if ctx.output.is_json() {
                ctx.output.json(&product);
                return Ok(());
            }
            ctx.output.success(&format!("Updated product {}", product.id));
            print_product(&product, ctx);
            Ok(())
        }
        ProductCommand::Delete { pid, yes } => delete_product(&pid, yes, ctx).await,
        ProductCommand::Show { pid } => show_product(&pid, ctx).await,
        ProductCommand::Search { term } => search_products(&term, ctx).await,
    }
}

async fn delete_product(pid: &str, yes: bool, ctx: &Context) -> Result<()> {
    if !confirm(&format!("Delete product {} and its reviews?", pid), yes)? {
        ctx.output.info("Cancelled");
        return Ok(());
    }

    let session = ctx.open()?;
    if !session.market.delete_product(&ProductId::new(pid))? {
        bail!("Product '{}' not found", pid);
    }
    let report = session.market.run_pending_tasks();
    session.flush()?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "deleted": pid, "tasks": report }));
        return Ok(());
    }
    ctx.output.success(&format!("Deleted product {}", pid));
    if report.failed > 0 {
        ctx.output.warn(&format!(
            "{} cleanup task(s) failed and will be retried by `renthub tasks run`",
            report.failed
        ));
    }
    Ok(())
}

async fn show_product(pid: &str, ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let pid = ProductId::new(pid);
    let Some(product) = session.market.product(&pid)? else {
        bail!("Product '{}' not found", pid);
    };
    let document = session.market.product_document(&pid)?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "product": product, "document": document }));
        return Ok(());
    }

    ctx.output.header(&format!("Product {}", product.id));
    print_product(&product, ctx);

    ctx.output.info("");
    match document {
        Some(document) => {
            ctx.output.info(&format!("Search document {}", document.doc_id));
            let indexed = document
                .rating()
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| "-".to_string());
            ctx.output.kv("indexed rating", &indexed);
            if let Some(text) = document.field(fields::DESCRIPTION).and_then(|v| v.as_text()) {
                ctx.output.kv("description", text);
            }
        }
        None => ctx.output.warn("No search document"),
    }
    Ok(())
}

async fn search_products(term: &str, ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let results = session.index().search(term);

    if ctx.output.is_json() {
        ctx.output.json(&results);
        return Ok(());
    }

    if results.is_empty() {
        ctx.output.info(&format!("No products match '{}'", term));
        return Ok(());
    }

    ctx.output.table_row(&["PRODUCT", "NAME", "CATEGORY", "RATING"], &[24, 30, 14, 8]);
    for document in &results {
        let text = |field: &str| {
            document
                .field(field)
                .and_then(|v| v.as_text())
                .unwrap_or("-")
                .to_string()
        };
        let rating = document
            .rating()
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "-".to_string());
        ctx.output.table_row(
            &[&document.pid, &text(fields::NAME), &text(fields::CATEGORY), &rating],
            &[24, 30, 14, 8],
        );
    }
    ctx.output.info(&format!("Total: {} product(s)", results.len()));
    Ok(())
}

fn print_product(product: &Product, ctx: &Context) {
    ctx.output.kv("name", &product.name);
    ctx.output.kv("category", &product.category);
    ctx.output.kv("price", &product.price.to_string());
    ctx.output.kv("rating", &format_rating(product.avg_rating, product.num_reviews));
    ctx.output.kv(
        "index",
        &flag_badge(product.needs_review_reindex, "reindex pending", "up to date"),
    );
    if let Some(location) = &product.location {
        ctx.output.kv("location", location);
    }
    if let (Some(start), Some(end)) = (product.start_date, product.end_date) {
        ctx.output.kv("available", &format!("{} to {}", start, end));
    }
}
