// Task Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::account::Account;
use crate::domain::error::DomainError;
use crate::domain::fleet::Fleet;
use crate::domain::message::WorkItem;

/// Task ID (database identity; 0 = not yet persisted)
pub type TaskId = u64;

/// Kind of remote action a task performs.
///
/// The numeric codes are part of the worker wire protocol and must not be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TaskType {
    Attack,
    Explore,
    Login,
    QueryPlanetId,
}

impl TaskType {
    /// Instant types are one-off dispatches with no persisted task row.
    pub fn is_instant(self) -> bool {
        matches!(self, TaskType::Login | TaskType::QueryPlanetId)
    }
}

impl From<TaskType> for i32 {
    fn from(t: TaskType) -> i32 {
        match t {
            TaskType::Attack => 1,
            TaskType::Explore => 4,
            TaskType::Login => 99,
            TaskType::QueryPlanetId => 100,
        }
    }
}

impl TryFrom<i32> for TaskType {
    type Error = DomainError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(TaskType::Attack),
            4 => Ok(TaskType::Explore),
            99 => Ok(TaskType::Login),
            100 => Ok(TaskType::QueryPlanetId),
            other => Err(DomainError::UnknownTaskType(other)),
        }
    }
}

/// Scheduling state of a recurring task.
///
/// Ready -> Running happens only in the generator's dispatch path;
/// Running -> Ready only in the reconciler (or via stuck-task recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Waiting,
    Ready,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Waiting => write!(f, "waiting"),
            TaskStatus::Ready => write!(f, "ready"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(TaskStatus::Running),
            "waiting" => Ok(TaskStatus::Waiting),
            "ready" => Ok(TaskStatus::Ready),
            other => Err(DomainError::UnknownTaskStatus(other.to_string())),
        }
    }
}

/// One addressable coordinate a task can act on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub galaxy: i32,
    pub system: i32,
    pub planet: i32,
    pub is_moon: bool,
}

impl Target {
    pub fn new(galaxy: i32, system: i32, planet: i32, is_moon: bool) -> Self {
        Self {
            galaxy,
            system,
            planet,
            is_moon,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}:{}]", self.galaxy, self.system, self.planet)?;
        if self.is_moon {
            write!(f, "(moon)")?;
        }
        Ok(())
    }
}

/// Recurring unit of scheduled work owned by an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Epoch seconds of the next planned start.
    pub next_start: i64,
    pub enabled: bool,
    pub account_id: crate::domain::AccountId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Ordered target list; `next_index` selects the next one round-robin.
    pub targets: Vec<Target>,
    pub next_index: usize,
    pub repeat: i32,
    pub fleet: Fleet,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        account_id: crate::domain::AccountId,
        task_type: TaskType,
        targets: Vec<Target>,
        fleet: Fleet,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            next_start: 0,
            enabled: false,
            account_id,
            task_type,
            status: TaskStatus::Ready,
            targets,
            next_index: 0,
            repeat: 0,
            fleet,
        }
    }

    /// Whether the round-robin cursor points inside the target list.
    pub fn cursor_in_range(&self) -> bool {
        self.next_index < self.targets.len()
    }

    /// Build the work item for the current cursor position and advance the
    /// cursor in memory.
    ///
    /// The cursor moves before the item is ever published: even if the
    /// publish or the worker dies, the next sweep continues with the next
    /// target instead of hammering the same one forever.
    pub fn prepare_dispatch(
        &mut self,
        account: &Account,
        correlation_token: String,
    ) -> Result<WorkItem, DomainError> {
        if self.targets.is_empty() {
            return Err(DomainError::NoTargets);
        }
        if self.next_index >= self.targets.len() {
            return Err(DomainError::CursorOutOfRange {
                index: self.next_index,
                len: self.targets.len(),
            });
        }

        let current = self.next_index;
        self.next_index = (self.next_index + 1) % self.targets.len();

        Ok(WorkItem {
            task_id: self.id,
            correlation_token,
            name: self.name.clone(),
            next_start: self.next_start,
            enabled: self.enabled,
            account: account.snapshot(),
            task_type: self.task_type,
            target: self.targets[current].clone(),
            repeat: self.repeat,
            fleet: self.fleet.clone(),
        })
    }
}
