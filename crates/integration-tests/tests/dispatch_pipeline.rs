//! End-to-end scheduling pipeline over the in-memory ports:
//! sweep -> broker -> (simulated worker) -> reconciler -> next sweep.

use std::sync::Arc;

use armada_core::application::constants::{POST_SUCCESS_DELAY_SECS, TASK_QUEUE};
use armada_core::application::generator::{GeneratorConfig, TaskGenerator};
use armada_core::application::reconciler::{ReconcilerConfig, ResultReconciler};
use armada_core::domain::{
    Account, Fleet, LogStatus, Target, Task, TaskResult, TaskStatus, TaskType, WorkItem,
};
use armada_core::port::broker::mocks::MockBroker;
use armada_core::port::task_repository::mocks::MemoryTaskRepository;
use armada_core::port::time_provider::mocks::FixedTimeProvider;
use armada_core::port::token_provider::mocks::SequentialTokenProvider;

const NOW: i64 = 1_700_000_000;

struct Pipeline {
    repo: MemoryTaskRepository,
    broker: Arc<MockBroker>,
    clock: Arc<FixedTimeProvider>,
    generator: Arc<TaskGenerator>,
    reconciler: ResultReconciler,
}

fn pipeline() -> Pipeline {
    let repo = MemoryTaskRepository::new();
    let broker = Arc::new(MockBroker::new());
    let clock = Arc::new(FixedTimeProvider::new(NOW));

    let generator = Arc::new(TaskGenerator::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        broker.clone(),
        Arc::new(SequentialTokenProvider::new()),
        clock.clone(),
        GeneratorConfig::default(),
    ));
    let reconciler = ResultReconciler::new(
        Arc::new(repo.clone()),
        broker.clone(),
        clock.clone(),
        ReconcilerConfig::default(),
    );

    Pipeline {
        repo,
        broker,
        clock,
        generator,
        reconciler,
    }
}

fn seed_account(repo: &MemoryTaskRepository, targets: Vec<Target>) {
    let mut account = Account::new("cmdr", "pw", "cmdr@example.com", "andromeda-3");
    account.id = 1;
    account.expire_at = NOW + 30 * 86_400;

    let mut task = Task::new("expedition", 1, TaskType::Explore, targets, Fleet::default());
    task.id = 5;
    task.enabled = true;
    task.status = TaskStatus::Ready;
    task.next_start = NOW;
    account.tasks.push(task);

    repo.add_account(account);
}

fn worker_result(item: &WorkItem, status: LogStatus, completed_at: i64) -> TaskResult {
    TaskResult {
        task_id: item.task_id,
        correlation_token: item.correlation_token.clone(),
        status,
        task_type: item.task_type,
        completed_at,
        message: String::new(),
        error_message: String::new(),
    }
}

#[tokio::test]
async fn full_cycle_success_then_redispatch() {
    let p = pipeline();
    let targets = vec![Target::new(1, 1, 1, false), Target::new(2, 2, 2, false)];
    seed_account(&p.repo, targets.clone());

    // Sweep 1: dispatch target[0], task goes Running.
    assert_eq!(p.generator.sweep().await, 1);
    let item: WorkItem = serde_json::from_slice(&p.broker.published()[0].body).unwrap();
    assert_eq!(item.target, targets[0]);
    assert_eq!(p.broker.published()[0].routing_key, TASK_QUEUE);
    assert_eq!(p.repo.task(5).unwrap().status, TaskStatus::Running);

    // While Running the next sweep must not double-dispatch.
    assert_eq!(p.generator.sweep().await, 0);

    // The worker finishes a minute later.
    let completed_at = NOW + 60;
    p.reconciler
        .handle_result(&worker_result(&item, LogStatus::Success, completed_at))
        .await
        .unwrap();

    let task = p.repo.task(5).unwrap();
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.next_start, completed_at + POST_SUCCESS_DELAY_SECS);
    assert_eq!(
        p.repo.log(&item.correlation_token).unwrap().status,
        LogStatus::Success
    );

    // Sweep 2 after the post-completion delay: target rotation continues.
    p.clock.set(completed_at + POST_SUCCESS_DELAY_SECS);
    assert_eq!(p.generator.sweep().await, 1);
    let second: WorkItem = serde_json::from_slice(&p.broker.published()[1].body).unwrap();
    assert_eq!(second.target, targets[1]);
    assert_ne!(second.correlation_token, item.correlation_token);
}

#[tokio::test]
async fn full_cycle_failure_backs_off_an_hour() {
    let p = pipeline();
    seed_account(&p.repo, vec![Target::new(1, 1, 1, false)]);

    assert_eq!(p.generator.sweep().await, 1);
    let item: WorkItem = serde_json::from_slice(&p.broker.published()[0].body).unwrap();

    // Failure observed later; backoff counts from reconciliation time.
    p.clock.set(NOW + 300);
    p.reconciler
        .handle_result(&worker_result(&item, LogStatus::Failed, NOW + 290))
        .await
        .unwrap();

    let task = p.repo.task(5).unwrap();
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.next_start, NOW + 300 + 3600);

    // The retry lands exactly on the look-ahead boundary: the next sweep
    // picks it up but parks it in the delayed exchange for the full hour.
    assert_eq!(p.generator.sweep().await, 1);
    let retry = p.broker.published().pop().unwrap();
    assert_eq!(retry.delay, Some(std::time::Duration::from_secs(3600)));
}

#[tokio::test]
async fn lost_result_is_recovered_by_staleness_window() {
    let p = pipeline();
    seed_account(&p.repo, vec![Target::new(1, 1, 1, false)]);

    assert_eq!(p.generator.sweep().await, 1);
    assert_eq!(p.repo.task(5).unwrap().status, TaskStatus::Running);

    // The result never arrives. Four hours later the sweep resets the task
    // and, since it is Ready and overdue, immediately dispatches again.
    p.clock.set(NOW + 4 * 3600 + 60);
    assert_eq!(p.generator.sweep().await, 1);

    let task = p.repo.task(5).unwrap();
    assert_eq!(task.status, TaskStatus::Running, "re-dispatched after recovery");
    assert_eq!(p.broker.published().len(), 2);
    assert_eq!(p.repo.log_count(), 2, "fresh token for the re-dispatch");
}

#[tokio::test]
async fn duplicate_worker_result_is_idempotent() {
    let p = pipeline();
    seed_account(&p.repo, vec![Target::new(1, 1, 1, false)]);

    p.generator.sweep().await;
    let item: WorkItem = serde_json::from_slice(&p.broker.published()[0].body).unwrap();

    let result = worker_result(&item, LogStatus::Success, NOW + 60);
    p.reconciler.handle_result(&result).await.unwrap();
    let after_first = p.repo.task(5).unwrap();

    // Redelivered by the broker (at-least-once): second apply is a no-op.
    p.clock.set(NOW + 999);
    p.reconciler.handle_result(&result).await.unwrap();

    assert_eq!(p.repo.task(5).unwrap(), after_first);
}
