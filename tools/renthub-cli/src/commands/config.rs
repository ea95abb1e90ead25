//! Configuration management commands.

use anyhow::{bail, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::generate_default_config;
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx).await,
        ConfigCommand::Init {
            force,
            account_email,
        } => init_config(force, &account_email, ctx).await,
        ConfigCommand::Validate => validate_config(ctx).await,
    }
}

async fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    let config = &ctx.config;

    ctx.output.info("[store]");
    ctx.output.kv("path", &config.store.path.display().to_string());
    ctx.output.kv("max_entity_groups", &config.store.max_entity_groups.to_string());
    ctx.output.kv("max_retries", &config.store.max_retries.to_string());

    ctx.output.info("[search]");
    ctx.output.kv("path", &config.search.path.display().to_string());

    ctx.output.info("[ratings]");
    ctx.output.kv("batch_update", &config.ratings.batch_update.to_string());

    ctx.output.info("[tasks]");
    ctx.output.kv("path", &config.tasks.path.display().to_string());
    ctx.output.kv("max_attempts", &config.tasks.max_attempts.to_string());
    ctx.output.kv("backoff_base_ms", &config.tasks.backoff_base_ms.to_string());
    ctx.output.kv("backoff_max_ms", &config.tasks.backoff_max_ms.to_string());

    ctx.output.info("[payments]");
    ctx.output.kv("account_email", &config.payments.account_email);
    ctx.output.kv("sandbox", &config.payments.sandbox.to_string());

    ctx.output.info("[logging]");
    ctx.output.kv("level", &config.logging.level.to_string());
    ctx.output.kv("format", &format!("{:?}", config.logging.format).to_lowercase());

    Ok(())
}

async fn init_config(force: bool, account_email: &str, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join("renthub.toml");

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, generate_default_config(account_email))?;
    ctx.output.success(&format!("Created: {}", config_path.display()));

    Ok(())
}

async fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    if let Err(e) = ctx.config.validate() {
        bail!("Configuration is invalid: {}", e);
    }

    let mut warnings: Vec<String> = Vec::new();
    if ctx.config_path.is_none() {
        warnings.push("no config file found; using defaults".to_string());
    }
    if !ctx.config.payments.sandbox {
        warnings.push("payments.sandbox is off; notifications are verified against live PayPal".to_string());
    }
    if ctx.config.store.max_retries == 0 {
        warnings.push("store.max_retries is 0; conflicting rating updates fail immediately".to_string());
    }

    for warning in &warnings {
        ctx.output.warn(&format!("Warning: {}", warning));
    }

    if warnings.is_empty() {
        ctx.output.success("Configuration is valid");
    } else {
        ctx.output.success("Configuration is valid (with warnings)");
    }
    Ok(())
}
