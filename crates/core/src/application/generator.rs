//! Task Generator
//!
//! Periodic sweep that decides which tasks are due, advances their
//! round-robin cursor inside a row-locked transaction and hands the work
//! item to the broker with delayed delivery.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::application::constants::{
    DISPATCH_LOOK_AHEAD_SECS, FALLBACK_DISPATCH_DELAY, MAX_CONCURRENT_ACCOUNTS,
    STUCK_TASK_WINDOW_SECS, SWEEP_INTERVAL, SWEEP_STARTUP_DELAY, TASK_QUEUE,
};
use crate::application::shutdown::ShutdownToken;
use crate::domain::{Account, Task, TaskLog, TaskStatus};
use crate::error::Result;
use crate::port::{
    AccountRepository, Broker, DispatchTransaction, TaskRepository, TimeProvider, TokenProvider,
    TransactionalTaskRepository,
};

/// Timing knobs of the sweep loop.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub sweep_interval: Duration,
    pub startup_delay: Duration,
    /// Tasks starting within this many seconds are dispatched now.
    pub look_ahead_secs: i64,
    /// Running tasks older than this are reset to Ready.
    pub stuck_window_secs: i64,
    /// Publish delay when the start time is already in the past.
    pub fallback_delay: Duration,
    pub max_concurrent_accounts: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: SWEEP_INTERVAL,
            startup_delay: SWEEP_STARTUP_DELAY,
            look_ahead_secs: DISPATCH_LOOK_AHEAD_SECS,
            stuck_window_secs: STUCK_TASK_WINDOW_SECS,
            fallback_delay: FALLBACK_DISPATCH_DELAY,
            max_concurrent_accounts: MAX_CONCURRENT_ACCOUNTS,
        }
    }
}

/// Why a task was passed over in the current sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NotReady,
    TooEarly,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "task disabled"),
            SkipReason::NotReady => write!(f, "task not in ready status"),
            SkipReason::TooEarly => write!(f, "too early to generate"),
        }
    }
}

/// Cheap to clone: every field is shared behind an Arc.
#[derive(Clone)]
pub struct TaskGenerator {
    accounts: Arc<dyn AccountRepository>,
    tasks: Arc<dyn TaskRepository>,
    tx_repo: Arc<dyn TransactionalTaskRepository>,
    broker: Arc<dyn Broker>,
    tokens: Arc<dyn TokenProvider>,
    clock: Arc<dyn TimeProvider>,
    config: GeneratorConfig,
}

impl TaskGenerator {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        tasks: Arc<dyn TaskRepository>,
        tx_repo: Arc<dyn TransactionalTaskRepository>,
        broker: Arc<dyn Broker>,
        tokens: Arc<dyn TokenProvider>,
        clock: Arc<dyn TimeProvider>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            accounts,
            tasks,
            tx_repo,
            broker,
            tokens,
            clock,
            config,
        }
    }

    /// Sweep loop. Runs until the shutdown token fires; the current sweep
    /// always finishes before the loop exits.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        tokio::select! {
            _ = sleep(self.config.startup_delay) => {},
            _ = shutdown.wait() => return,
        }
        info!("task generator loop started");

        loop {
            if shutdown.is_shutdown() {
                break;
            }
            let dispatched = self.sweep().await;
            debug!(dispatched, "sweep complete");

            tokio::select! {
                _ = sleep(self.config.sweep_interval) => {},
                _ = shutdown.wait() => break,
            }
        }
        info!("task generator loop stopped");
    }

    /// One sweep cycle: every active account is processed concurrently,
    /// bounded by `max_concurrent_accounts`. Individual account failures
    /// are logged and swallowed. Returns the number of dispatched tasks.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now_secs();
        let accounts = match self.accounts.load_active_accounts(now).await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "failed to fetch accounts for sweep");
                return 0;
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_accounts));
        let mut workers: JoinSet<usize> = JoinSet::new();

        for account in accounts {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let generator = self.clone();
            workers.spawn(async move {
                let _permit = permit;
                match generator.generate_for_account(&account).await {
                    Ok(count) => count,
                    Err(e) => {
                        error!(
                            account_id = account.id,
                            error = %e,
                            "failed to generate tasks for account"
                        );
                        0
                    }
                }
            });
        }

        let mut dispatched = 0;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(count) => dispatched += count,
                Err(e) => error!(error = %e, "account sweep task panicked"),
            }
        }
        dispatched
    }

    /// Process every task of one account: recover stuck tasks, repair the
    /// cursor, dispatch what is due. A failure on one task never stops the
    /// account's remaining tasks.
    async fn generate_for_account(&self, account: &Account) -> Result<usize> {
        let now = self.clock.now_secs();
        let stale_before = now - self.config.stuck_window_secs;
        let mut dispatched = 0;

        for task in &account.tasks {
            let mut task = task.clone();

            // A Running task whose start time predates the staleness window
            // lost its result (broker outage, dead worker); hand it back to
            // the scheduler.
            if task.status == TaskStatus::Running && task.next_start < stale_before {
                warn!(
                    task_id = task.id,
                    task_name = %task.name,
                    next_start = task.next_start,
                    "task stuck in running state, resetting to ready"
                );
                if let Err(e) = self.tasks.update_status(task.id, TaskStatus::Ready).await {
                    error!(task_id = task.id, error = %e, "failed to reset task status");
                    continue;
                }
                task.status = TaskStatus::Ready;
            }

            // Cursor repair after target-list shrinkage.
            if task.next_index != 0 && task.next_index >= task.targets.len() {
                warn!(
                    task_id = task.id,
                    next_index = task.next_index,
                    targets = task.targets.len(),
                    "cursor out of range, resetting to 0"
                );
                if let Err(e) = self.tasks.reset_cursor(task.id).await {
                    error!(task_id = task.id, error = %e, "failed to reset cursor");
                    continue;
                }
                task.next_index = 0;
            }

            if let Err(reason) = self.eligibility(&task, now) {
                debug!(
                    task_id = task.id,
                    task_name = %task.name,
                    next_start = task.next_start,
                    reason = %reason,
                    "task not ready"
                );
                continue;
            }

            match self.dispatch(account, &mut task).await {
                Ok(()) => dispatched += 1,
                Err(e) => {
                    error!(
                        task_id = task.id,
                        task_name = %task.name,
                        error = %e,
                        "dispatch failed"
                    );
                }
            }
        }
        Ok(dispatched)
    }

    /// A task is dispatch-eligible iff it is enabled, Ready, and due within
    /// the look-ahead window.
    fn eligibility(&self, task: &Task, now: i64) -> std::result::Result<(), SkipReason> {
        if !task.enabled {
            return Err(SkipReason::Disabled);
        }
        if task.status != TaskStatus::Ready {
            return Err(SkipReason::NotReady);
        }
        if task.next_start - now > self.config.look_ahead_secs {
            return Err(SkipReason::TooEarly);
        }
        Ok(())
    }

    /// Dispatch one due task: row-lock it, create the correlation record,
    /// persist the advanced cursor, then publish with delayed delivery and
    /// mark the task Running.
    async fn dispatch(&self, account: &Account, task: &mut Task) -> Result<()> {
        let token = self.tokens.mint();
        let item = task.prepare_dispatch(account, token.clone())?;

        let mut tx = self.tx_repo.begin_dispatch().await?;
        if let Err(e) = Self::stage_dispatch(tx.as_mut(), task, &token).await {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(task_id = task.id, error = %rollback_err, "rollback failed");
            }
            return Err(e);
        }
        tx.commit().await?;

        let body = serde_json::to_vec(&item)?;
        let delay = self.dispatch_delay(item.next_start);
        debug!(
            task_id = task.id,
            correlation_token = %token,
            delay_ms = delay.as_millis() as u64,
            "publishing work item"
        );
        self.broker.publish_delayed(body, TASK_QUEUE, delay).await?;

        // The task leaves the scheduler's hands only after the publish
        // actually went out.
        self.tasks.update_status(task.id, TaskStatus::Running).await?;
        task.status = TaskStatus::Running;

        info!(
            task_id = task.id,
            task_name = %task.name,
            correlation_token = %token,
            "task dispatched"
        );
        Ok(())
    }

    async fn stage_dispatch(
        tx: &mut (dyn DispatchTransaction + '_),
        task: &Task,
        token: &str,
    ) -> Result<()> {
        tx.lock_task(task.id).await?;
        tx.insert_log(&TaskLog::running(
            task.id,
            token.to_string(),
            task.task_type,
        ))
        .await?;
        // `task.next_index` was already advanced by prepare_dispatch.
        tx.update_cursor(task.id, task.next_index).await?;
        Ok(())
    }

    fn dispatch_delay(&self, next_start: i64) -> Duration {
        let until = next_start - self.clock.now_secs();
        if until < 0 {
            self.config.fallback_delay
        } else {
            Duration::from_secs(until as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fleet, Target, TaskType, WorkItem};
    use crate::port::broker::mocks::MockBroker;
    use crate::port::task_repository::mocks::MemoryTaskRepository;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::token_provider::mocks::SequentialTokenProvider;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        repo: MemoryTaskRepository,
        broker: Arc<MockBroker>,
        clock: Arc<FixedTimeProvider>,
        generator: TaskGenerator,
    }

    fn fixture() -> Fixture {
        let repo = MemoryTaskRepository::new();
        let broker = Arc::new(MockBroker::new());
        let clock = Arc::new(FixedTimeProvider::new(NOW));
        let generator = TaskGenerator::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            broker.clone(),
            Arc::new(SequentialTokenProvider::new()),
            clock.clone(),
            GeneratorConfig::default(),
        );
        Fixture {
            repo,
            broker,
            clock,
            generator,
        }
    }

    fn account_with_task(task: Task) -> Account {
        let mut account = Account::new("cmdr", "pw", "cmdr@example.com", "andromeda-3");
        account.id = 1;
        account.expire_at = NOW + 86_400;
        account.tasks.push(task);
        account
    }

    fn ready_task(targets: Vec<Target>) -> Task {
        let mut task = Task::new("raid", 1, TaskType::Attack, targets, Fleet::default());
        task.id = 10;
        task.enabled = true;
        task.status = TaskStatus::Ready;
        task.next_start = NOW;
        task
    }

    #[tokio::test]
    async fn due_task_is_dispatched_with_current_target() {
        let f = fixture();
        let a = Target::new(1, 2, 3, false);
        let b = Target::new(4, 5, 6, true);
        let mut task = ready_task(vec![a, b.clone()]);
        task.next_index = 1;
        f.repo.add_account(account_with_task(task));

        let dispatched = f.generator.sweep().await;
        assert_eq!(dispatched, 1);

        let published = f.broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, TASK_QUEUE);
        assert_eq!(published[0].delay, Some(Duration::from_secs(0)));

        let item: WorkItem = serde_json::from_slice(&published[0].body).unwrap();
        assert_eq!(item.target, b);
        assert_eq!(item.task_id, 10);
        assert_eq!(item.account.username, "cmdr");

        let task = f.repo.task(10).unwrap();
        assert_eq!(task.next_index, 0, "cursor advanced and wrapped");
        assert_eq!(task.status, TaskStatus::Running);

        let log = f.repo.log(&item.correlation_token).unwrap();
        assert_eq!(log.task_id, 10);
        assert_eq!(log.status, crate::domain::LogStatus::Running);
    }

    #[tokio::test]
    async fn disabled_task_is_never_selected() {
        let f = fixture();
        let mut task = ready_task(vec![Target::new(1, 1, 1, false)]);
        task.enabled = false;
        task.next_start = NOW - 100;
        f.repo.add_account(account_with_task(task));

        assert_eq!(f.generator.sweep().await, 0);
        assert!(f.broker.published().is_empty());
        assert_eq!(f.repo.log_count(), 0);
    }

    #[tokio::test]
    async fn running_task_is_never_selected() {
        let f = fixture();
        let mut task = ready_task(vec![Target::new(1, 1, 1, false)]);
        task.status = TaskStatus::Running;
        f.repo.add_account(account_with_task(task));

        assert_eq!(f.generator.sweep().await, 0);
        assert!(f.broker.published().is_empty());
    }

    #[tokio::test]
    async fn task_beyond_look_ahead_window_is_skipped() {
        let f = fixture();
        let mut task = ready_task(vec![Target::new(1, 1, 1, false)]);
        task.next_start = NOW + DISPATCH_LOOK_AHEAD_SECS + 1;
        f.repo.add_account(account_with_task(task));

        assert_eq!(f.generator.sweep().await, 0);
        assert!(f.broker.published().is_empty());
    }

    #[tokio::test]
    async fn task_within_look_ahead_window_is_dispatched_with_delay() {
        let f = fixture();
        let mut task = ready_task(vec![Target::new(1, 1, 1, false)]);
        task.next_start = NOW + 120;
        f.repo.add_account(account_with_task(task));

        assert_eq!(f.generator.sweep().await, 1);
        let published = f.broker.published();
        assert_eq!(published[0].delay, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn overdue_task_uses_fallback_delay() {
        let f = fixture();
        let mut task = ready_task(vec![Target::new(1, 1, 1, false)]);
        task.next_start = NOW - 30;
        f.repo.add_account(account_with_task(task));

        assert_eq!(f.generator.sweep().await, 1);
        assert_eq!(
            f.broker.published()[0].delay,
            Some(FALLBACK_DISPATCH_DELAY)
        );
    }

    #[tokio::test]
    async fn stuck_running_task_is_reset_to_ready() {
        let f = fixture();
        let mut task = ready_task(vec![Target::new(1, 1, 1, false)]);
        // Disabled so recovery is observable without a dispatch following it.
        task.enabled = false;
        task.status = TaskStatus::Running;
        task.next_start = NOW - STUCK_TASK_WINDOW_SECS - 60;
        f.repo.add_account(account_with_task(task));

        f.generator.sweep().await;

        let task = f.repo.task(10).unwrap();
        assert_eq!(task.status, TaskStatus::Ready);
        assert!(f.broker.published().is_empty());
    }

    #[tokio::test]
    async fn recently_dispatched_running_task_is_left_alone() {
        let f = fixture();
        let mut task = ready_task(vec![Target::new(1, 1, 1, false)]);
        task.status = TaskStatus::Running;
        task.next_start = NOW - 60;
        f.repo.add_account(account_with_task(task));

        f.generator.sweep().await;

        assert_eq!(f.repo.task(10).unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn out_of_range_cursor_is_repaired_before_dispatch() {
        let f = fixture();
        let first = Target::new(9, 9, 9, false);
        let mut task = ready_task(vec![first.clone(), Target::new(8, 8, 8, false)]);
        task.next_index = 5;
        f.repo.add_account(account_with_task(task));

        assert_eq!(f.generator.sweep().await, 1);

        let item: WorkItem = serde_json::from_slice(&f.broker.published()[0].body).unwrap();
        assert_eq!(item.target, first, "repaired cursor starts from 0");
        assert_eq!(f.repo.task(10).unwrap().next_index, 1);
    }

    #[tokio::test]
    async fn task_without_targets_is_not_dispatched() {
        let f = fixture();
        let task = ready_task(vec![]);
        f.repo.add_account(account_with_task(task));

        assert_eq!(f.generator.sweep().await, 0);
        assert!(f.broker.published().is_empty());
        assert_eq!(f.repo.log_count(), 0, "no correlation record without a publish");
    }

    #[tokio::test]
    async fn publish_failure_leaves_task_ready() {
        let f = fixture();
        let task = ready_task(vec![Target::new(1, 1, 1, false)]);
        f.repo.add_account(account_with_task(task));
        f.broker.fail_publishes(true);

        assert_eq!(f.generator.sweep().await, 0);

        let task = f.repo.task(10).unwrap();
        assert_eq!(task.status, TaskStatus::Ready, "never marked running");
        // The cursor already moved: the next sweep continues with the next
        // target instead of repeating this one forever.
        assert_eq!(task.next_index, 0);
        assert_eq!(f.repo.log_count(), 1);
    }

    #[tokio::test]
    async fn expired_account_is_not_swept() {
        let f = fixture();
        let task = ready_task(vec![Target::new(1, 1, 1, false)]);
        let mut account = account_with_task(task);
        account.expire_at = NOW - 1;
        f.repo.add_account(account);

        assert_eq!(f.generator.sweep().await, 0);
        assert!(f.broker.published().is_empty());
    }

    #[tokio::test]
    async fn cursor_walks_round_robin_across_sweeps() {
        let f = fixture();
        let targets: Vec<Target> = (0..3).map(|i| Target::new(i, 0, 0, false)).collect();
        let task = ready_task(targets.clone());
        f.repo.add_account(account_with_task(task));

        for n in 0..6 {
            // Hand the task back to the scheduler as the reconciler would.
            let mut task = f.repo.task(10).unwrap();
            task.status = TaskStatus::Ready;
            task.next_start = f.clock.now_secs();
            f.repo.put_task(task);

            assert_eq!(f.generator.sweep().await, 1);
            let published = f.broker.published();
            let item: WorkItem = serde_json::from_slice(&published[n].body).unwrap();
            assert_eq!(item.target, targets[n % 3]);
            assert_eq!(f.repo.task(10).unwrap().next_index, (n + 1) % 3);
        }
    }
}
