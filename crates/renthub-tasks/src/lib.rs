//! Deferred task queue for RentHub.
//!
//! Tasks are delivered at least once and in no particular order. A task
//! enqueued through [`TaskQueue::enqueue_transactional`] becomes visible only
//! when the surrounding store transaction commits.

mod error;
mod queue;
mod retry;

pub use error::TaskError;
pub use queue::{DeadLetter, QueueSnapshot, QueuedTask, RunReport, TaskQueue};
pub use retry::{BackoffStrategy, RetryPolicy};
