//! Deferred task commands.

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{TasksArgs, TasksCommand};
use crate::context::Context;

/// Run the tasks command.
pub async fn run(args: TasksArgs, ctx: &Context) -> Result<()> {
    match args.command {
        Some(TasksCommand::Run) => run_tasks(ctx).await,
        Some(TasksCommand::List) | None => list_tasks(ctx).await,
        Some(TasksCommand::Dead) => list_dead(ctx).await,
        Some(TasksCommand::Retry { id }) => retry_task(id, ctx).await,
    }
}

async fn run_tasks(ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let spinner = ctx.output.spinner("Running due tasks...");
    let report = session.market.run_pending_tasks();
    spinner.finish_and_clear();
    session.flush()?;

    if ctx.output.is_json() {
        ctx.output.json(&report);
        return Ok(());
    }
    if report.attempted() == 0 {
        ctx.output.info("No tasks due");
        return Ok(());
    }
    ctx.output.success(&format!("Executed {} task(s)", report.executed));
    if report.failed > 0 {
        ctx.output.warn(&format!("{} task(s) failed and were rescheduled", report.failed));
    }
    if report.dead_lettered > 0 {
        ctx.output.error(&format!(
            "{} task(s) gave up; see `renthub tasks dead`",
            report.dead_lettered
        ));
    }
    Ok(())
}

async fn list_tasks(ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let pending = session.market.tasks().pending();

    if ctx.output.is_json() {
        ctx.output.json(&pending);
        return Ok(());
    }
    if pending.is_empty() {
        ctx.output.info("No pending tasks");
        return Ok(());
    }

    ctx.output.table_row(&["ID", "TASK", "ATTEMPTS", "DUE", "LAST ERROR"], &[6, 24, 8, 20, 40]);
    for task in &pending {
        ctx.output.table_row(
            &[
                &task.id.to_string(),
                task.task.name(),
                &task.attempts.to_string(),
                &format_timestamp(&task.available_at),
                task.last_error.as_deref().unwrap_or("-"),
            ],
            &[6, 24, 8, 20, 40],
        );
    }
    ctx.output.info(&format!("Total: {} task(s)", pending.len()));
    Ok(())
}

async fn list_dead(ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    let dead = session.market.tasks().dead_letters();

    if ctx.output.is_json() {
        ctx.output.json(&dead);
        return Ok(());
    }
    if dead.is_empty() {
        ctx.output.success("No dead-lettered tasks");
        return Ok(());
    }

    ctx.output.table_row(&["ID", "TASK", "ATTEMPTS", "FAILED", "ERROR"], &[6, 24, 8, 20, 40]);
    for letter in &dead {
        ctx.output.table_row(
            &[
                &letter.id.to_string(),
                letter.task.name(),
                &letter.attempts.to_string(),
                &format_timestamp(&letter.failed_at),
                &letter.error,
            ],
            &[6, 24, 8, 20, 40],
        );
    }
    Ok(())
}

async fn retry_task(id: u64, ctx: &Context) -> Result<()> {
    let session = ctx.open()?;
    session.market.tasks().retry_dead(id)?;
    session.flush()?;
    ctx.output.success(&format!("Task {} queued again", id));
    Ok(())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
