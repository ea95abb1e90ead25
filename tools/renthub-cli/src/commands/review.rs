//! Review commands.

use anyhow::Result;
use renthub_market::ProductId;

use super::{ReviewArgs, ReviewCommand};
use crate::context::Context;
use crate::output::format_rating;

/// Run the review command.
pub async fn run(args: ReviewArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ReviewCommand::Add {
            pid,
            rating,
            username,
            comment,
        } => add_review(&pid, rating, &username, &comment, ctx).await,
        ReviewCommand::List { pid } => list_reviews(&pid, ctx).await,
    }
}

async fn add_review(
    pid: &str,
    rating: i64,
    username: &str,
    comment: &str,
    ctx: &Context,
) -> Result<()> {
    let session = ctx.open()?;
    let (product, review) =
        session
            .market
            .submit_review(&ProductId::new(pid), username, rating, comment)?;
    session.flush()?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "product": product, "review": review }));
        return Ok(());
    }

    ctx.output.success(&format!("Review {} added", review.id));
    ctx.output.kv("rating", &review.rating.to_string());
    ctx.output.kv(
        "product rating",
        &format_rating(product.avg_rating, product.num_reviews),
    );
    if ctx.config.ratings.batch_update {
        ctx.output.info("Search index will pick this up on the next `renthub ratings sweep`");
    } else {
        ctx.output.info("Run `renthub tasks run` to update the search index");
    }
    Ok(())
}

async fn list_reviews(pid: &str, ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let reviews = session.market.product_reviews(&ProductId::new(pid))?;

    if ctx.output.is_json() {
        ctx.output.json(&reviews);
        return Ok(());
    }

    if reviews.is_empty() {
        ctx.output.info(&format!("No reviews for product {}", pid));
        return Ok(());
    }

    ctx.output.table_row(&["DATE", "USER", "RATING", "COMMENT"], &[20, 16, 6, 40]);
    for review in &reviews {
        let date = review.date_added.format("%Y-%m-%d %H:%M").to_string();
        ctx.output.table_row(
            &[&date, &review.username, &review.rating.to_string(), &review.comment],
            &[20, 16, 6, 40],
        );
    }
    ctx.output.info(&format!("Total: {} review(s)", reviews.len()));
    Ok(())
}
