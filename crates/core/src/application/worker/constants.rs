// Worker and scheduler constants
use std::time::Duration;

/// Global per-run time limit; a wedged endpoint is cut off after this
pub const DEFAULT_RUN_TIME_LIMIT: Duration = Duration::from_secs(60 * 60);

/// Number of workers, i.e. runs executing in parallel
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Runs that may wait for a worker before submissions are rejected
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Longest the scheduler sleeps before re-checking its trigger table
pub const SCHEDULER_MAX_SLEEP: Duration = Duration::from_secs(60);
