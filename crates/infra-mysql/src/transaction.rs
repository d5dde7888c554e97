// MySQL Transaction Implementations
// Dispatch: row-lock -> correlation record -> cursor advance, atomically.
// Reconcile: monotonic log close + task reschedule.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{MySql, Transaction as SqlxTransaction};

use armada_core::domain::{LogStatus, TaskId, TaskLog, TaskStatus};
use armada_core::error::{AppError, Result};
use armada_core::port::{
    DispatchTransaction, ReconcileTransaction, TimeProvider, Transaction,
};

use crate::task_repository::map_sqlx_error;

pub struct MySqlDispatchTransaction {
    tx: SqlxTransaction<'static, MySql>,
    clock: Arc<dyn TimeProvider>,
}

impl MySqlDispatchTransaction {
    pub fn new(tx: SqlxTransaction<'static, MySql>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { tx, clock }
    }
}

#[async_trait]
impl Transaction for MySqlDispatchTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl DispatchTransaction for MySqlDispatchTransaction {
    async fn lock_task(&mut self, id: TaskId) -> Result<()> {
        // Holds the row lock until commit/rollback; a concurrent sweep
        // blocks here instead of double-dispatching.
        let locked: Option<u64> =
            sqlx::query_scalar("SELECT id FROM tasks WHERE id = ? FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

        match locked {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("task {id}"))),
        }
    }

    async fn insert_log(&mut self, log: &TaskLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_logs \
             (task_id, correlation_token, task_type, status, message, error_message, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.task_id)
        .bind(&log.correlation_token)
        .bind(i32::from(log.task_type))
        .bind(i32::from(log.status))
        .bind(&log.message)
        .bind(&log.error_message)
        .bind(self.clock.now_secs())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_cursor(&mut self, id: TaskId, next_index: usize) -> Result<()> {
        sqlx::query("UPDATE tasks SET next_index = ? WHERE id = ?")
            .bind(next_index as i32)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

pub struct MySqlReconcileTransaction {
    tx: SqlxTransaction<'static, MySql>,
}

impl MySqlReconcileTransaction {
    pub fn new(tx: SqlxTransaction<'static, MySql>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Transaction for MySqlReconcileTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl ReconcileTransaction for MySqlReconcileTransaction {
    async fn close_log(
        &mut self,
        token: &str,
        status: LogStatus,
        message: &str,
        error_message: &str,
    ) -> Result<bool> {
        // The status guard makes the terminal transition happen at most
        // once; a duplicate result affects zero rows.
        let result = sqlx::query(
            "UPDATE task_logs SET status = ?, message = ?, error_message = ? \
             WHERE correlation_token = ? AND status = ?",
        )
        .bind(i32::from(status))
        .bind(message)
        .bind(error_message)
        .bind(token)
        .bind(i32::from(LogStatus::Running))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reschedule_task(
        &mut self,
        id: TaskId,
        status: TaskStatus,
        next_start: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = ?, next_start = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(next_start)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
