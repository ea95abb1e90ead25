//! Loading and saving the marketplace config file.

use std::path::Path;

use anyhow::{Context, Result};
use renthub_market::MarketConfig;

/// Config file names searched for, in order.
pub const CONFIG_NAMES: [&str; 3] = ["renthub.toml", ".renthub.toml", "renthub.json"];

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "json")
}

/// Load config from a TOML or JSON file.
pub fn load(path: &Path) -> Result<MarketConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    if is_json(path) {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path.display()))
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }
}

/// Save config to a file, choosing the format by extension.
pub fn save(config: &MarketConfig, path: &Path) -> Result<()> {
    let content = if is_json(path) {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config)?
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

/// Generate a default renthub.toml.
pub fn generate_default_config(account_email: &str) -> String {
    format!(
        r#"# RentHub marketplace configuration

[store]
path = ".renthub/store.json"
max_entity_groups = 5
max_retries = 3

[search]
path = ".renthub/index.json"

[ratings]
# Leave products dirty and reindex them with `renthub ratings sweep`.
batch_update = false

[tasks]
path = ".renthub/tasks.json"
max_attempts = 5
backoff_base_ms = 100
backoff_max_ms = 5000

[payments]
account_email = "{account_email}"
sandbox = true

[logging]
level = "info"
format = "human"
"#,
        account_email = account_email
    )
}
