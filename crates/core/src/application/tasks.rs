//! Task CRUD use cases backing the RPC surface.
//!
//! Permission checks happen in the caller; these use cases only enforce
//! structural validity.

use std::sync::Arc;

use tracing::info;

use crate::domain::{Fleet, Target, Task, TaskId, TaskStatus, TaskType};
use crate::error::{AppError, Result};
use crate::port::TaskRepository;

/// Request to create a recurring task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub account_id: crate::domain::AccountId,
    pub task_type: TaskType,
    pub next_start: i64,
    pub enabled: bool,
    pub targets: Vec<Target>,
    pub repeat: i32,
    pub fleet: Fleet,
}

/// Partial update; None leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub next_start: Option<i64>,
    pub enabled: Option<bool>,
    pub task_type: Option<TaskType>,
    pub targets: Option<Vec<Target>>,
    pub repeat: Option<i32>,
    pub fleet: Option<Fleet>,
}

pub struct TaskCommandService {
    tasks: Arc<dyn TaskRepository>,
}

impl TaskCommandService {
    pub fn new(tasks: Arc<dyn TaskRepository>) -> Self {
        Self { tasks }
    }

    pub async fn add_task(&self, new: NewTask) -> Result<TaskId> {
        if new.name.trim().is_empty() {
            return Err(AppError::Validation("task name must not be empty".into()));
        }
        if new.account_id == 0 {
            return Err(AppError::Validation("task needs an owning account".into()));
        }
        if new.task_type.is_instant() {
            return Err(AppError::Validation(
                "instant task types cannot be scheduled recurringly".into(),
            ));
        }

        let mut task = Task::new(
            new.name,
            new.account_id,
            new.task_type,
            new.targets,
            new.fleet,
        );
        task.next_start = new.next_start;
        task.enabled = new.enabled;
        task.repeat = new.repeat;
        task.status = TaskStatus::Ready;

        let id = self.tasks.insert_task(&task).await?;
        info!(task_id = id, account_id = task.account_id, "task created");
        Ok(id)
    }

    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let mut task = self
            .tasks
            .find_task(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;

        if let Some(name) = patch.name {
            task.name = name;
        }
        if let Some(next_start) = patch.next_start {
            task.next_start = next_start;
        }
        if let Some(enabled) = patch.enabled {
            task.enabled = enabled;
        }
        if let Some(task_type) = patch.task_type {
            if task_type.is_instant() {
                return Err(AppError::Validation(
                    "instant task types cannot be scheduled recurringly".into(),
                ));
            }
            task.task_type = task_type;
        }
        if let Some(repeat) = patch.repeat {
            task.repeat = repeat;
        }
        if let Some(fleet) = patch.fleet {
            task.fleet = fleet;
        }
        if let Some(targets) = patch.targets {
            // A replaced target list restarts the rotation.
            task.targets = targets;
            task.next_index = 0;
        }

        self.tasks.update_task(&task).await?;
        info!(task_id = id, "task updated");
        Ok(task)
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<()> {
        self.tasks.delete_task(id).await?;
        info!(task_id = id, "task deleted");
        Ok(())
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.tasks
            .find_task(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))
    }

    pub async fn list_tasks(&self, account_id: crate::domain::AccountId) -> Result<Vec<Task>> {
        self.tasks.find_tasks_by_account(account_id).await
    }
}
