//! CLI execution context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use renthub_db::Db;
use renthub_market::{MarketConfig, Marketplace};
use renthub_search::MemoryIndex;
use renthub_tasks::TaskQueue;

use crate::config::{self, CONFIG_NAMES};
use crate::output::Output;

/// Execution context for CLI commands.
pub struct Context {
    /// Marketplace configuration.
    pub config: MarketConfig,
    /// File the configuration came from, if any.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

/// An opened marketplace together with its persistent backends.
pub struct Session {
    pub market: Marketplace,
    db: Arc<Db>,
    index: Arc<MemoryIndex>,
    tasks: Arc<TaskQueue<renthub_market::MarketTask>>,
}

impl Session {
    /// The search index, for text search.
    pub fn index(&self) -> &MemoryIndex {
        &self.index
    }

    /// Write store, index and task queue back to their files.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to save the entity store")?;
        self.index.flush().context("Failed to save the search index")?;
        self.tasks.flush().context("Failed to save the task queue")?;
        tracing::debug!(pending_tasks = self.tasks.len(), "marketplace state saved");
        Ok(())
    }
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (config, config_path) = if let Some(path) = config_path {
            let path = PathBuf::from(path);
            (config::load(&path)?, Some(path))
        } else {
            // Try to find config in current directory or parent directories
            match Self::find_config(&cwd) {
                Some(path) => (config::load(&path)?, Some(path)),
                None => (MarketConfig::default(), None),
            }
        };

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Find config file in directory tree.
    fn find_config(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            for name in &CONFIG_NAMES {
                let config_path = current.join(name);
                if config_path.exists() {
                    return Some(config_path);
                }
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Directory relative data paths are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.config_path
            .as_ref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cwd.clone())
    }

    /// Resolve a configured path relative to the config file.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Open the marketplace from the configured files.
    pub fn open(&self) -> Result<Session> {
        self.config.validate()?;

        let store_path = self.resolve_path(&self.config.store.path);
        let index_path = self.resolve_path(&self.config.search.path);
        let tasks_path = self.resolve_path(&self.config.tasks.path);
        for path in [&store_path, &index_path, &tasks_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        self.output.debug(&format!("store: {}", store_path.display()));
        let db = Arc::new(
            Db::open(&store_path, self.config.store.db_options())
                .with_context(|| format!("Failed to open store {}", store_path.display()))?,
        );
        let index = Arc::new(
            MemoryIndex::open(&index_path)
                .with_context(|| format!("Failed to open index {}", index_path.display()))?,
        );
        let tasks = Arc::new(
            TaskQueue::open(&tasks_path, self.config.tasks.retry_policy())
                .with_context(|| format!("Failed to open task queue {}", tasks_path.display()))?,
        );

        let market = Marketplace::new(db.clone(), index.clone(), tasks.clone(), self.config.clone());
        Ok(Session {
            market,
            db,
            index,
            tasks,
        })
    }
}
