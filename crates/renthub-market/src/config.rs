//! Marketplace configuration.

use std::path::PathBuf;
use std::time::Duration;

use renthub_db::DbOptions;
use renthub_observability::LogConfig;
use renthub_tasks::{BackoffStrategy, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::MarketError;

/// Full marketplace configuration. Every section has defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Entity store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Search index settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Rating synchronization settings.
    #[serde(default)]
    pub ratings: RatingsConfig,

    /// Deferred task settings.
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Payment notification settings.
    #[serde(default)]
    pub payments: PaymentConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LogConfig,
}

impl MarketConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.store.max_entity_groups == 0 {
            return Err(MarketError::Validation(
                "store.max_entity_groups must be at least 1".to_string(),
            ));
        }
        if self.tasks.max_attempts == 0 {
            return Err(MarketError::Validation(
                "tasks.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.tasks.backoff_base_ms > self.tasks.backoff_max_ms {
            return Err(MarketError::Validation(
                "tasks.backoff_base_ms must not exceed tasks.backoff_max_ms".to_string(),
            ));
        }
        if self.payments.account_email.trim().is_empty() {
            return Err(MarketError::Validation(
                "payments.account_email must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Config with the batched rating sweep enabled or disabled.
    pub fn with_batch_ratings(mut self, batch: bool) -> Self {
        self.ratings.batch_update = batch;
        self
    }
}

/// Entity store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Entity groups a cross-group transaction may touch.
    #[serde(default = "default_max_entity_groups")]
    pub max_entity_groups: usize,

    /// Automatic retries of a conflicting transaction.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".renthub/store.json")
}

fn default_max_entity_groups() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_entity_groups: default_max_entity_groups(),
            max_retries: default_max_retries(),
        }
    }
}

impl StoreConfig {
    /// Store options for these settings.
    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            max_entity_groups: self.max_entity_groups,
            max_retries: self.max_retries,
            ..DbOptions::default()
        }
    }
}

/// Search index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Index file.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".renthub/index.json")
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

/// Rating synchronization settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingsConfig {
    /// Leave products dirty for the periodic sweep instead of scheduling
    /// one reindex task per folded review.
    #[serde(default)]
    pub batch_update: bool,
}

/// Deferred task settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Queue file.
    #[serde(default = "default_tasks_path")]
    pub path: PathBuf,

    /// Deliveries before a task is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Retry delay cap.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_tasks_path() -> PathBuf {
    PathBuf::from(".renthub/tasks.json")
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    5000
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            path: default_tasks_path(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl TasksConfig {
    /// Retry policy for these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts).with_backoff(BackoffStrategy::Exponential {
            base: Duration::from_millis(self.backoff_base_ms),
            max: Duration::from_millis(self.backoff_max_ms),
        })
    }
}

const SANDBOX_VERIFY_URL: &str = "https://www.sandbox.paypal.com/cgi-bin/webscr";
const LIVE_VERIFY_URL: &str = "https://www.paypal.com/cgi-bin/webscr";

/// Payment notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Account that must receive a payment for it to be recorded.
    #[serde(default = "default_account_email")]
    pub account_email: String,

    /// Verify against the PayPal sandbox rather than production.
    #[serde(default = "default_sandbox")]
    pub sandbox: bool,
}

fn default_account_email() -> String {
    "s01@test.com".to_string()
}

fn default_sandbox() -> bool {
    true
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            account_email: default_account_email(),
            sandbox: default_sandbox(),
        }
    }
}

impl PaymentConfig {
    /// Endpoint notifications are echoed to for verification.
    pub fn verify_url(&self) -> &'static str {
        if self.sandbox {
            SANDBOX_VERIFY_URL
        } else {
            LIVE_VERIFY_URL
        }
    }
}
