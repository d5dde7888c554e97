//! Result Reconciler
//!
//! Consumes the result stream, joins each result to its correlation record
//! by token and applies exactly one terminal transition. Duplicate or
//! unknown results are logged no-ops; a lost result is eventually repaired
//! by the generator's stuck-task recovery, not here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::application::constants::{
    CONSUME_RETRY_DELAY, FAILURE_BACKOFF_SECS, MAX_CONCURRENT_RESULTS, POST_SUCCESS_DELAY_SECS,
    RESULT_QUEUE,
};
use crate::application::shutdown::ShutdownToken;
use crate::domain::{LogStatus, TaskResult, TaskStatus, TaskType};
use crate::error::Result;
use crate::port::{Broker, ReconcileTransaction, TimeProvider, TransactionalTaskRepository};

/// Timing knobs of the reconciliation path.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Reschedule backoff after a failed result.
    pub failure_backoff_secs: i64,
    /// Reschedule offset after a successful result.
    pub success_delay_secs: i64,
    /// Sleep before resubscribing after the stream closes.
    pub consume_retry_delay: Duration,
    pub max_concurrent_results: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            failure_backoff_secs: FAILURE_BACKOFF_SECS,
            success_delay_secs: POST_SUCCESS_DELAY_SECS,
            consume_retry_delay: CONSUME_RETRY_DELAY,
            max_concurrent_results: MAX_CONCURRENT_RESULTS,
        }
    }
}

pub struct ResultReconciler {
    tx_repo: Arc<dyn TransactionalTaskRepository>,
    broker: Arc<dyn Broker>,
    clock: Arc<dyn TimeProvider>,
    config: ReconcilerConfig,
}

impl ResultReconciler {
    pub fn new(
        tx_repo: Arc<dyn TransactionalTaskRepository>,
        broker: Arc<dyn Broker>,
        clock: Arc<dyn TimeProvider>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            tx_repo,
            broker,
            clock,
            config,
        }
    }

    /// Delivery loop: subscribe to the result queue, fan every delivery out
    /// to a bounded concurrent handler, resubscribe forever on stream
    /// closure. A slow or failing reconciliation never blocks intake.
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownToken) {
        info!(queue = RESULT_QUEUE, "result reconciler started");
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_results));

        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let mut deliveries = match self.broker.consume(RESULT_QUEUE).await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(error = %e, queue = RESULT_QUEUE, "failed to consume result queue");
                    tokio::select! {
                        _ = sleep(self.config.consume_retry_delay) => continue,
                        _ = shutdown.wait() => break,
                    }
                }
            };

            loop {
                tokio::select! {
                    delivery = deliveries.recv() => {
                        let Some(body) = delivery else { break };
                        let result: TaskResult = match serde_json::from_slice(&body) {
                            Ok(result) => result,
                            Err(e) => {
                                // Malformed payloads are dropped, not retried.
                                warn!(error = %e, bytes = body.len(), "discarding malformed result");
                                continue;
                            }
                        };
                        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                            break;
                        };
                        let reconciler = Arc::clone(&self);
                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(e) = reconciler.handle_result(&result).await {
                                error!(
                                    correlation_token = %result.correlation_token,
                                    task_id = result.task_id,
                                    error = %e,
                                    "failed to reconcile result"
                                );
                            }
                        });
                    }
                    _ = shutdown.wait() => {
                        info!("result reconciler stopped");
                        return;
                    }
                }
            }

            warn!(queue = RESULT_QUEUE, "result stream closed, resubscribing");
            tokio::select! {
                _ = sleep(self.config.consume_retry_delay) => {},
                _ = shutdown.wait() => break,
            }
        }
        info!("result reconciler stopped");
    }

    /// Apply one result inside one transaction. Returns Ok even when the
    /// result turned out to be a duplicate (the transition is monotonic).
    pub async fn handle_result(&self, result: &TaskResult) -> Result<()> {
        debug!(
            correlation_token = %result.correlation_token,
            task_id = result.task_id,
            status = i32::from(result.status),
            completed_at = result.completed_at,
            "handling result"
        );

        let mut tx = self.tx_repo.begin_reconcile().await?;
        match self.apply(tx.as_mut(), result).await {
            Ok(applied) => {
                tx.commit().await?;
                if !applied {
                    info!(
                        correlation_token = %result.correlation_token,
                        "result already reconciled, ignoring duplicate"
                    );
                }
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut (dyn ReconcileTransaction + '_),
        result: &TaskResult,
    ) -> Result<bool> {
        let terminal = if result.status == LogStatus::Success {
            LogStatus::Success
        } else {
            LogStatus::Failed
        };

        let applied = tx
            .close_log(
                &result.correlation_token,
                terminal,
                &result.message,
                &result.error_message,
            )
            .await?;
        if !applied {
            return Ok(false);
        }

        match result.task_type {
            // Instant types have no task row to update.
            TaskType::Login | TaskType::QueryPlanetId => {}
            _ if terminal == LogStatus::Success => {
                let next_start = result.completed_at + self.config.success_delay_secs;
                tx.reschedule_task(result.task_id, TaskStatus::Ready, next_start)
                    .await?;
            }
            _ => {
                // Failures back off longer than successes, throttling
                // retry of failing accounts.
                let next_start = self.clock.now_secs() + self.config.failure_backoff_secs;
                tx.reschedule_task(result.task_id, TaskStatus::Ready, next_start)
                    .await?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fleet, Task, TaskLog};
    use crate::port::broker::mocks::MockBroker;
    use crate::port::task_repository::mocks::MemoryTaskRepository;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        repo: MemoryTaskRepository,
        reconciler: ResultReconciler,
    }

    fn fixture() -> Fixture {
        let repo = MemoryTaskRepository::new();
        let reconciler = ResultReconciler::new(
            Arc::new(repo.clone()),
            Arc::new(MockBroker::new()),
            Arc::new(FixedTimeProvider::new(NOW)),
            ReconcilerConfig::default(),
        );
        Fixture { repo, reconciler }
    }

    fn seed_running_task(repo: &MemoryTaskRepository, id: u64, token: &str, ty: TaskType) {
        let mut task = Task::new("probe", 1, ty, vec![], Fleet::default());
        task.id = id;
        task.status = TaskStatus::Running;
        repo.put_task(task);
        repo.put_log(TaskLog::running(id, token.to_string(), ty));
    }

    fn result(task_id: u64, token: &str, status: LogStatus, ty: TaskType) -> TaskResult {
        TaskResult {
            task_id,
            correlation_token: token.to_string(),
            status,
            task_type: ty,
            completed_at: NOW + 42,
            message: String::new(),
            error_message: String::new(),
        }
    }

    #[tokio::test]
    async fn failed_result_backs_off_and_readies_task() {
        let f = fixture();
        seed_running_task(&f.repo, 7, "tok-f", TaskType::Explore);

        f.reconciler
            .handle_result(&result(7, "tok-f", LogStatus::Failed, TaskType::Explore))
            .await
            .unwrap();

        let task = f.repo.task(7).unwrap();
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.next_start, NOW + FAILURE_BACKOFF_SECS);
        assert_eq!(f.repo.log("tok-f").unwrap().status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn successful_result_reschedules_from_completion_time() {
        let f = fixture();
        seed_running_task(&f.repo, 7, "tok-s", TaskType::Attack);

        f.reconciler
            .handle_result(&result(7, "tok-s", LogStatus::Success, TaskType::Attack))
            .await
            .unwrap();

        let task = f.repo.task(7).unwrap();
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.next_start, NOW + 42 + POST_SUCCESS_DELAY_SECS);
        assert_eq!(f.repo.log("tok-s").unwrap().status, LogStatus::Success);
    }

    #[tokio::test]
    async fn login_result_touches_only_the_log() {
        let f = fixture();
        f.repo
            .put_log(TaskLog::running(0, "tok-l".to_string(), TaskType::Login));

        let mut r = result(0, "tok-l", LogStatus::Success, TaskType::Login);
        r.message = "welcome".to_string();
        f.reconciler.handle_result(&r).await.unwrap();

        let log = f.repo.log("tok-l").unwrap();
        assert_eq!(log.status, LogStatus::Success);
        assert_eq!(log.message, "welcome");
    }

    #[tokio::test]
    async fn planet_query_result_stores_message_and_error() {
        let f = fixture();
        f.repo.put_log(TaskLog::running(
            0,
            "tok-p".to_string(),
            TaskType::QueryPlanetId,
        ));

        let mut r = result(0, "tok-p", LogStatus::Failed, TaskType::QueryPlanetId);
        r.error_message = "no such planet".to_string();
        f.reconciler.handle_result(&r).await.unwrap();

        let log = f.repo.log("tok-p").unwrap();
        assert_eq!(log.status, LogStatus::Failed);
        assert_eq!(log.error_message, "no such planet");
    }

    #[tokio::test]
    async fn duplicate_result_does_not_leave_terminal_state() {
        let f = fixture();
        seed_running_task(&f.repo, 7, "tok-d", TaskType::Explore);

        f.reconciler
            .handle_result(&result(7, "tok-d", LogStatus::Success, TaskType::Explore))
            .await
            .unwrap();
        let first = f.repo.task(7).unwrap().next_start;

        // Same token again, this time claiming failure: must change nothing.
        f.reconciler
            .handle_result(&result(7, "tok-d", LogStatus::Failed, TaskType::Explore))
            .await
            .unwrap();

        let task = f.repo.task(7).unwrap();
        assert_eq!(task.next_start, first);
        assert_eq!(f.repo.log("tok-d").unwrap().status, LogStatus::Success);
    }

    #[tokio::test]
    async fn unknown_token_is_a_no_op() {
        let f = fixture();
        f.reconciler
            .handle_result(&result(9, "ghost", LogStatus::Success, TaskType::Attack))
            .await
            .unwrap();
        assert_eq!(f.repo.log_count(), 0);
    }

    #[tokio::test]
    async fn running_status_in_result_is_treated_as_failure() {
        // Workers only report terminal states; a stray 0 must not park the
        // log in Running forever.
        let f = fixture();
        seed_running_task(&f.repo, 7, "tok-r", TaskType::Explore);

        f.reconciler
            .handle_result(&result(7, "tok-r", LogStatus::Running, TaskType::Explore))
            .await
            .unwrap();

        assert_eq!(f.repo.log("tok-r").unwrap().status, LogStatus::Failed);
    }

    #[tokio::test]
    async fn delivery_loop_reconciles_injected_results() {
        let repo = MemoryTaskRepository::new();
        let broker = Arc::new(MockBroker::new());
        let clock = Arc::new(FixedTimeProvider::new(NOW));
        seed_running_task(&repo, 7, "tok-loop", TaskType::Explore);

        let reconciler = Arc::new(ResultReconciler::new(
            Arc::new(repo.clone()),
            broker.clone(),
            clock,
            ReconcilerConfig::default(),
        ));

        let (sender, token) = crate::application::shutdown::shutdown_channel();
        let handle = tokio::spawn(Arc::clone(&reconciler).run(token));

        // Give the loop a moment to subscribe, then feed it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let body =
            serde_json::to_vec(&result(7, "tok-loop", LogStatus::Success, TaskType::Explore))
                .unwrap();
        broker.inject(body).await;
        broker.inject(b"not json".to_vec()).await; // must be survived

        tokio::time::sleep(Duration::from_millis(100)).await;
        sender.shutdown();
        handle.await.unwrap();

        assert_eq!(repo.log("tok-loop").unwrap().status, LogStatus::Success);
        assert_eq!(repo.task(7).unwrap().status, TaskStatus::Ready);
    }
}
