// MySQL Repository Implementation

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::MySqlPool;

use armada_core::domain::{
    Account, AccountId, Fleet, Target, Task, TaskId, TaskLog, TaskStatus, TaskType,
};
use armada_core::error::{AppError, Result};
use armada_core::port::{
    AccountRepository, DispatchTransaction, ReconcileTransaction, TaskLogRepository,
    TaskRepository, TimeProvider, TransactionalTaskRepository,
};

use crate::transaction::{MySqlDispatchTransaction, MySqlReconcileTransaction};

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                // MySQL error numbers: https://dev.mysql.com/doc/mysql-errors/
                match code.as_ref() {
                    "1062" => AppError::Conflict(format!(
                        "Unique constraint violation: {}",
                        db_err.message()
                    )),
                    "1452" => AppError::Database(format!(
                        "Foreign key constraint violation: {}",
                        db_err.message()
                    )),
                    "1205" => {
                        AppError::Database(format!("Lock wait timeout: {}", db_err.message()))
                    }
                    "1213" => AppError::Database(format!("Deadlock: {}", db_err.message())),
                    other => {
                        AppError::Database(format!("Database error [{other}]: {}", db_err.message()))
                    }
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {col}"))
        }
        _ => AppError::Database(err.to_string()),
    }
}

pub struct MySqlTaskRepository {
    pool: MySqlPool,
    clock: Arc<dyn TimeProvider>,
}

impl MySqlTaskRepository {
    pub fn new(pool: MySqlPool, clock: Arc<dyn TimeProvider>) -> Self {
        Self { pool, clock }
    }

    /// Load a task's targets and fleet and assemble the domain entity.
    async fn load_task_tree(&self, row: TaskRow) -> Result<Task> {
        let targets: Vec<TargetRow> = sqlx::query_as(
            "SELECT galaxy, `system`, planet, is_moon FROM targets \
             WHERE task_id = ? ORDER BY position ASC, id ASC",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let fleet: Option<FleetRow> = sqlx::query_as(
            "SELECT lf, hf, cr, bs, bomb, de, ds, sc, lc, recy, esp \
             FROM fleets WHERE task_id = ?",
        )
        .bind(row.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.into_task(
            targets.into_iter().map(TargetRow::into_target).collect(),
            fleet.map(FleetRow::into_fleet).unwrap_or_default(),
        )
    }

    async fn load_tasks_for_account(&self, account_id: AccountId) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, name, next_start, enabled, account_id, task_type, status, \
                    next_index, repeat_count \
             FROM tasks WHERE account_id = ? AND deleted_at IS NULL ORDER BY id ASC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(self.load_task_tree(row).await?);
        }
        Ok(tasks)
    }
}

#[async_trait]
impl AccountRepository for MySqlTaskRepository {
    async fn load_active_accounts(&self, now: i64) -> Result<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            "SELECT id, username, password, email, server, expire_at \
             FROM accounts WHERE expire_at > ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let mut account = row.into_account();
            account.tasks = self.load_tasks_for_account(account.id).await?;
            accounts.push(account);
        }
        Ok(accounts)
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT id, username, password, email, server, expire_at \
             FROM accounts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AccountRow::into_account))
    }
}

#[async_trait]
impl TaskRepository for MySqlTaskRepository {
    async fn insert_task(&self, task: &Task) -> Result<TaskId> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            "INSERT INTO tasks (name, next_start, enabled, account_id, task_type, \
                                status, next_index, repeat_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.name)
        .bind(task.next_start)
        .bind(task.enabled)
        .bind(task.account_id)
        .bind(i32::from(task.task_type))
        .bind(task.status.to_string())
        .bind(task.next_index as i32)
        .bind(task.repeat)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let id = result.last_insert_id();

        insert_targets(&mut tx, id, &task.targets).await?;
        insert_fleet(&mut tx, id, &task.fleet).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(id)
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            "UPDATE tasks SET name = ?, next_start = ?, enabled = ?, task_type = ?, \
                    status = ?, next_index = ?, repeat_count = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&task.name)
        .bind(task.next_start)
        .bind(task.enabled)
        .bind(i32::from(task.task_type))
        .bind(task.status.to_string())
        .bind(task.next_index as i32)
        .bind(task.repeat)
        .bind(task.id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("task {}", task.id)));
        }

        sqlx::query("DELETE FROM targets WHERE task_id = ?")
            .bind(task.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        insert_targets(&mut tx, task.id, &task.targets).await?;

        sqlx::query("DELETE FROM fleets WHERE task_id = ?")
            .bind(task.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        insert_fleet(&mut tx, task.id, &task.fleet).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_task(&self, id: TaskId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tasks SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(self.clock.now_secs())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT id, name, next_start, enabled, account_id, task_type, status, \
                    next_index, repeat_count \
             FROM tasks WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(self.load_task_tree(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_tasks_by_account(&self, account_id: AccountId) -> Result<Vec<Task>> {
        self.load_tasks_for_account(account_id).await
    }

    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn reset_cursor(&self, id: TaskId) -> Result<()> {
        sqlx::query("UPDATE tasks SET next_index = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl TaskLogRepository for MySqlTaskRepository {
    async fn find_log_by_token(&self, token: &str) -> Result<Option<TaskLog>> {
        let row: Option<TaskLogRow> = sqlx::query_as(
            "SELECT id, task_id, correlation_token, task_type, status, message, error_message \
             FROM task_logs WHERE correlation_token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(TaskLogRow::into_log).transpose()
    }
}

#[async_trait]
impl TransactionalTaskRepository for MySqlTaskRepository {
    async fn begin_dispatch(&self) -> Result<Box<dyn DispatchTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(MySqlDispatchTransaction::new(
            tx,
            Arc::clone(&self.clock),
        )))
    }

    async fn begin_reconcile(&self) -> Result<Box<dyn ReconcileTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(MySqlReconcileTransaction::new(tx)))
    }
}

async fn insert_targets(
    tx: &mut sqlx::Transaction<'static, sqlx::MySql>,
    task_id: TaskId,
    targets: &[Target],
) -> Result<()> {
    for (position, target) in targets.iter().enumerate() {
        sqlx::query(
            "INSERT INTO targets (task_id, galaxy, `system`, planet, is_moon, position) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(target.galaxy)
        .bind(target.system)
        .bind(target.planet)
        .bind(target.is_moon)
        .bind(position as i32)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }
    Ok(())
}

async fn insert_fleet(
    tx: &mut sqlx::Transaction<'static, sqlx::MySql>,
    task_id: TaskId,
    fleet: &Fleet,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO fleets (task_id, lf, hf, cr, bs, bomb, de, ds, sc, lc, recy, esp) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task_id)
    .bind(fleet.lf)
    .bind(fleet.hf)
    .bind(fleet.cr)
    .bind(fleet.bs)
    .bind(fleet.bomb)
    .bind(fleet.de)
    .bind(fleet.ds)
    .bind(fleet.sc)
    .bind(fleet.lc)
    .bind(fleet.recy)
    .bind(fleet.esp)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

/// MySQL row representations

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: u64,
    username: String,
    password: String,
    email: String,
    server: String,
    expire_at: i64,
}

impl AccountRow {
    fn into_account(self) -> Account {
        Account {
            id: self.id,
            username: self.username,
            password: self.password,
            email: self.email,
            server: self.server,
            expire_at: self.expire_at,
            tasks: Vec::new(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: u64,
    name: String,
    next_start: i64,
    enabled: bool,
    account_id: u64,
    task_type: i32,
    status: String,
    next_index: i32,
    repeat_count: i32,
}

impl TaskRow {
    fn into_task(self, targets: Vec<Target>, fleet: Fleet) -> Result<Task> {
        Ok(Task {
            id: self.id,
            name: self.name,
            next_start: self.next_start,
            enabled: self.enabled,
            account_id: self.account_id,
            task_type: TaskType::try_from(self.task_type)?,
            status: self.status.parse::<TaskStatus>()?,
            targets,
            next_index: self.next_index.max(0) as usize,
            repeat: self.repeat_count,
            fleet,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TargetRow {
    galaxy: i32,
    system: i32,
    planet: i32,
    is_moon: bool,
}

impl TargetRow {
    fn into_target(self) -> Target {
        Target {
            galaxy: self.galaxy,
            system: self.system,
            planet: self.planet,
            is_moon: self.is_moon,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FleetRow {
    lf: i64,
    hf: i64,
    cr: i64,
    bs: i64,
    bomb: i64,
    de: i64,
    ds: i64,
    sc: i64,
    lc: i64,
    recy: i64,
    esp: i64,
}

impl FleetRow {
    fn into_fleet(self) -> Fleet {
        Fleet {
            lf: self.lf,
            hf: self.hf,
            cr: self.cr,
            bs: self.bs,
            bomb: self.bomb,
            de: self.de,
            ds: self.ds,
            sc: self.sc,
            lc: self.lc,
            recy: self.recy,
            esp: self.esp,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskLogRow {
    id: u64,
    task_id: u64,
    correlation_token: String,
    task_type: i32,
    status: i32,
    message: String,
    error_message: String,
}

impl TaskLogRow {
    fn into_log(self) -> Result<TaskLog> {
        Ok(TaskLog {
            id: self.id,
            task_id: self.task_id,
            correlation_token: self.correlation_token,
            task_type: TaskType::try_from(self.task_type)?,
            status: armada_core::domain::LogStatus::try_from(self.status)?,
            message: self.message,
            error_message: self.error_message,
        })
    }
}
