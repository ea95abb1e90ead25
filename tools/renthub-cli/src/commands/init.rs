//! Project initialization.

use anyhow::{bail, Result};

use super::InitArgs;
use crate::config::{self, generate_default_config};
use crate::context::Context;

/// Run the init command.
pub async fn run(args: InitArgs, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join("renthub.toml");

    if config_path.exists() && !args.force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    ctx.output.header("Initializing RentHub marketplace");

    std::fs::write(&config_path, generate_default_config(&args.account_email))?;
    ctx.output.success(&format!("Created: {}", config_path.display()));

    let project = Context {
        config: config::load(&config_path)?,
        config_path: Some(config_path),
        output: ctx.output.clone(),
        cwd: ctx.cwd.clone(),
    };
    let session = project.open()?;
    let created = session.market.build_all_categories()?;
    session.flush()?;

    if created == 0 {
        ctx.output.info("Categories already exist; left unchanged");
    } else {
        ctx.output.success(&format!("Built {} categories", created));
    }
    ctx.output.kv("store", &project.resolve_path(&project.config.store.path).display().to_string());
    ctx.output.kv("index", &project.resolve_path(&project.config.search.path).display().to_string());
    ctx.output.kv("tasks", &project.resolve_path(&project.config.tasks.path).display().to_string());

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "categories_created": created }));
    }

    Ok(())
}
