// Scheduling constants (no magic values in the services)
use std::time::Duration;

/// Delay before the first sweep after startup (5s)
pub const SWEEP_STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Interval between sweep cycles (30s)
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Tasks due within this window are dispatched early; delayed delivery
/// absorbs the jitter between sweeps (60 minutes)
pub const DISPATCH_LOOK_AHEAD_SECS: i64 = 60 * 60;

/// A task Running longer than this is assumed to have lost its result and
/// is reset to Ready on the next sweep (4 hours)
pub const STUCK_TASK_WINDOW_SECS: i64 = 4 * 60 * 60;

/// Reschedule offset after a successful result (5s)
pub const POST_SUCCESS_DELAY_SECS: i64 = 5;

/// Reschedule backoff after a failed result (1 hour)
pub const FAILURE_BACKOFF_SECS: i64 = 3600;

/// Publish delay used when a task's start time is already in the past (5s)
pub const FALLBACK_DISPATCH_DELAY: Duration = Duration::from_secs(5);

/// Cap on concurrently processed accounts per sweep
pub const MAX_CONCURRENT_ACCOUNTS: usize = 16;

/// Cap on concurrently reconciled results
pub const MAX_CONCURRENT_RESULTS: usize = 64;

/// Sleep before resubscribing after the result stream closes (5s)
pub const CONSUME_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Queue carrying work items to the worker pool
pub const TASK_QUEUE: &str = "task_queue";

/// Queue carrying results back from the worker pool
pub const RESULT_QUEUE: &str = "result_queue";

/// Queue reserved for instant one-off work items
pub const INSTANT_QUEUE: &str = "instant_queue";

/// Delayed-delivery exchange the task queue is bound to
pub const DELAYED_EXCHANGE: &str = "delayed_exchange";
