// Persistence Ports
// Repository interfaces plus the transactional surfaces used by the
// dispatch and reconciliation paths.

use async_trait::async_trait;

use crate::domain::{Account, AccountId, LogStatus, Task, TaskId, TaskLog, TaskStatus};
use crate::error::Result;

/// Read access to accounts and their task trees.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Accounts with `expire_at > now`, tasks/targets/fleets eagerly loaded.
    async fn load_active_accounts(&self, now: i64) -> Result<Vec<Account>>;

    /// Single account without its task tree (credentials lookup).
    async fn find_account(&self, id: AccountId) -> Result<Option<Account>>;
}

/// Repository interface for Task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a task with its targets and fleet; returns the new id.
    async fn insert_task(&self, task: &Task) -> Result<TaskId>;

    /// Full update of a task, replacing targets and fleet.
    async fn update_task(&self, task: &Task) -> Result<()>;

    /// Soft-delete a task.
    async fn delete_task(&self, id: TaskId) -> Result<()>;

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>>;

    async fn find_tasks_by_account(&self, account_id: AccountId) -> Result<Vec<Task>>;

    /// Persist only the scheduling status.
    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<()>;

    /// Reset the round-robin cursor to 0 (target-list shrinkage repair).
    async fn reset_cursor(&self, id: TaskId) -> Result<()>;
}

/// Read access to correlation records (used by the poll accessors).
#[async_trait]
pub trait TaskLogRepository: Send + Sync {
    async fn find_log_by_token(&self, token: &str) -> Result<Option<TaskLog>>;
}

/// Transaction trait for atomic multi-step operations.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Operations inside one dispatch transaction: lock the task row, create
/// the correlation record, persist the advanced cursor. Strictly in that
/// order, atomically.
#[async_trait]
pub trait DispatchTransaction: Transaction {
    /// Row-lock the task for the duration of the transaction, so two
    /// overlapping sweeps cannot double-dispatch the same due occurrence.
    async fn lock_task(&mut self, id: TaskId) -> Result<()>;

    async fn insert_log(&mut self, log: &TaskLog) -> Result<()>;

    async fn update_cursor(&mut self, id: TaskId, next_index: usize) -> Result<()>;
}

/// Operations inside one reconciliation transaction.
#[async_trait]
pub trait ReconcileTransaction: Transaction {
    /// Move the log to a terminal status, storing result text. Returns
    /// false when the log is unknown or already terminal, which makes
    /// duplicate results a no-op.
    async fn close_log(
        &mut self,
        token: &str,
        status: LogStatus,
        message: &str,
        error_message: &str,
    ) -> Result<bool>;

    /// Hand the task back to the scheduler with a new start time.
    async fn reschedule_task(
        &mut self,
        id: TaskId,
        status: TaskStatus,
        next_start: i64,
    ) -> Result<()>;
}

/// Factory for the transactional surfaces.
#[async_trait]
pub trait TransactionalTaskRepository: Send + Sync {
    async fn begin_dispatch(&self) -> Result<Box<dyn DispatchTransaction>>;

    async fn begin_reconcile(&self) -> Result<Box<dyn ReconcileTransaction>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use crate::error::AppError;

    #[derive(Default)]
    struct MemoryState {
        accounts: Vec<Account>,
        tasks: HashMap<TaskId, Task>,
        logs: HashMap<String, TaskLog>,
        next_task_id: TaskId,
        next_log_id: u64,
    }

    /// In-memory repository implementing every persistence port.
    ///
    /// Transactions stage their writes and apply them on commit, so a
    /// rollback leaves no trace, just like the real adapter.
    #[derive(Clone, Default)]
    pub struct MemoryTaskRepository {
        state: Arc<Mutex<MemoryState>>,
    }

    impl MemoryTaskRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed an account; its embedded tasks are moved into the task table
        /// (ids assigned when 0).
        pub fn add_account(&self, mut account: Account) {
            let mut state = self.state.lock().unwrap();
            for mut task in account.tasks.drain(..) {
                if task.id == 0 {
                    state.next_task_id += 1;
                    task.id = state.next_task_id;
                }
                task.account_id = account.id;
                state.next_task_id = state.next_task_id.max(task.id);
                state.tasks.insert(task.id, task);
            }
            state.accounts.push(account);
        }

        pub fn task(&self, id: TaskId) -> Option<Task> {
            self.state.lock().unwrap().tasks.get(&id).cloned()
        }

        pub fn put_task(&self, task: Task) {
            let mut state = self.state.lock().unwrap();
            state.next_task_id = state.next_task_id.max(task.id);
            state.tasks.insert(task.id, task);
        }

        pub fn log(&self, token: &str) -> Option<TaskLog> {
            self.state.lock().unwrap().logs.get(token).cloned()
        }

        pub fn log_count(&self) -> usize {
            self.state.lock().unwrap().logs.len()
        }

        pub fn put_log(&self, log: TaskLog) {
            let mut state = self.state.lock().unwrap();
            state.next_log_id = state.next_log_id.max(log.id);
            state.logs.insert(log.correlation_token.clone(), log);
        }
    }

    #[async_trait]
    impl AccountRepository for MemoryTaskRepository {
        async fn load_active_accounts(&self, now: i64) -> Result<Vec<Account>> {
            let state = self.state.lock().unwrap();
            let mut out = Vec::new();
            for account in state.accounts.iter().filter(|a| a.expire_at > now) {
                let mut account = account.clone();
                let mut tasks: Vec<Task> = state
                    .tasks
                    .values()
                    .filter(|t| t.account_id == account.id)
                    .cloned()
                    .collect();
                tasks.sort_by_key(|t| t.id);
                account.tasks = tasks;
                out.push(account);
            }
            Ok(out)
        }

        async fn find_account(&self, id: AccountId) -> Result<Option<Account>> {
            let state = self.state.lock().unwrap();
            Ok(state.accounts.iter().find(|a| a.id == id).cloned())
        }
    }

    #[async_trait]
    impl TaskRepository for MemoryTaskRepository {
        async fn insert_task(&self, task: &Task) -> Result<TaskId> {
            let mut state = self.state.lock().unwrap();
            state.next_task_id += 1;
            let id = state.next_task_id;
            let mut task = task.clone();
            task.id = id;
            state.tasks.insert(id, task);
            Ok(id)
        }

        async fn update_task(&self, task: &Task) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if !state.tasks.contains_key(&task.id) {
                return Err(AppError::NotFound(format!("task {}", task.id)));
            }
            state.tasks.insert(task.id, task.clone());
            Ok(())
        }

        async fn delete_task(&self, id: TaskId) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state
                .tasks
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| AppError::NotFound(format!("task {id}")))
        }

        async fn find_task(&self, id: TaskId) -> Result<Option<Task>> {
            Ok(self.state.lock().unwrap().tasks.get(&id).cloned())
        }

        async fn find_tasks_by_account(&self, account_id: AccountId) -> Result<Vec<Task>> {
            let state = self.state.lock().unwrap();
            let mut tasks: Vec<Task> = state
                .tasks
                .values()
                .filter(|t| t.account_id == account_id)
                .cloned()
                .collect();
            tasks.sort_by_key(|t| t.id);
            Ok(tasks)
        }

        async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            match state.tasks.get_mut(&id) {
                Some(task) => {
                    task.status = status;
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("task {id}"))),
            }
        }

        async fn reset_cursor(&self, id: TaskId) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            match state.tasks.get_mut(&id) {
                Some(task) => {
                    task.next_index = 0;
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("task {id}"))),
            }
        }
    }

    #[async_trait]
    impl TaskLogRepository for MemoryTaskRepository {
        async fn find_log_by_token(&self, token: &str) -> Result<Option<TaskLog>> {
            Ok(self.state.lock().unwrap().logs.get(token).cloned())
        }
    }

    #[async_trait]
    impl TransactionalTaskRepository for MemoryTaskRepository {
        async fn begin_dispatch(&self) -> Result<Box<dyn DispatchTransaction>> {
            Ok(Box::new(MemoryDispatchTransaction {
                state: Arc::clone(&self.state),
                staged_log: None,
                staged_cursor: None,
            }))
        }

        async fn begin_reconcile(&self) -> Result<Box<dyn ReconcileTransaction>> {
            Ok(Box::new(MemoryReconcileTransaction {
                state: Arc::clone(&self.state),
                staged_log: None,
                staged_reschedule: None,
            }))
        }
    }

    struct MemoryDispatchTransaction {
        state: Arc<Mutex<MemoryState>>,
        staged_log: Option<TaskLog>,
        staged_cursor: Option<(TaskId, usize)>,
    }

    #[async_trait]
    impl Transaction for MemoryDispatchTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if let Some(mut log) = self.staged_log {
                state.next_log_id += 1;
                log.id = state.next_log_id;
                state.logs.insert(log.correlation_token.clone(), log);
            }
            if let Some((id, next_index)) = self.staged_cursor {
                if let Some(task) = state.tasks.get_mut(&id) {
                    task.next_index = next_index;
                }
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl DispatchTransaction for MemoryDispatchTransaction {
        async fn lock_task(&mut self, id: TaskId) -> Result<()> {
            let state = self.state.lock().unwrap();
            if state.tasks.contains_key(&id) {
                Ok(())
            } else {
                Err(AppError::NotFound(format!("task {id}")))
            }
        }

        async fn insert_log(&mut self, log: &TaskLog) -> Result<()> {
            let state = self.state.lock().unwrap();
            if state.logs.contains_key(&log.correlation_token) {
                return Err(AppError::Conflict(format!(
                    "correlation token {} already exists",
                    log.correlation_token
                )));
            }
            drop(state);
            self.staged_log = Some(log.clone());
            Ok(())
        }

        async fn update_cursor(&mut self, id: TaskId, next_index: usize) -> Result<()> {
            self.staged_cursor = Some((id, next_index));
            Ok(())
        }
    }

    struct MemoryReconcileTransaction {
        state: Arc<Mutex<MemoryState>>,
        staged_log: Option<(String, LogStatus, String, String)>,
        staged_reschedule: Option<(TaskId, TaskStatus, i64)>,
    }

    #[async_trait]
    impl Transaction for MemoryReconcileTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if let Some((token, status, message, error_message)) = self.staged_log {
                if let Some(log) = state.logs.get_mut(&token) {
                    log.status = status;
                    log.message = message;
                    log.error_message = error_message;
                }
            }
            if let Some((id, status, next_start)) = self.staged_reschedule {
                if let Some(task) = state.tasks.get_mut(&id) {
                    task.status = status;
                    task.next_start = next_start;
                }
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ReconcileTransaction for MemoryReconcileTransaction {
        async fn close_log(
            &mut self,
            token: &str,
            status: LogStatus,
            message: &str,
            error_message: &str,
        ) -> Result<bool> {
            let state = self.state.lock().unwrap();
            match state.logs.get(token) {
                Some(log) if log.status == LogStatus::Running => {
                    drop(state);
                    self.staged_log = Some((
                        token.to_string(),
                        status,
                        message.to_string(),
                        error_message.to_string(),
                    ));
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn reschedule_task(
            &mut self,
            id: TaskId,
            status: TaskStatus,
            next_start: i64,
        ) -> Result<()> {
            self.staged_reschedule = Some((id, status, next_start));
            Ok(())
        }
    }
}
