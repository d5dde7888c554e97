// Task Log Domain Model
// One row per dispatched work item, joined back to its result by token.

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;
use crate::domain::task::{TaskId, TaskType};

/// Lifecycle status of a dispatched work item.
///
/// The numeric codes are shared with the result wire value. A log moves
/// from Running to exactly one terminal status, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum LogStatus {
    Running,
    Success,
    Failed,
}

impl LogStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LogStatus::Success | LogStatus::Failed)
    }
}

impl From<LogStatus> for i32 {
    fn from(s: LogStatus) -> i32 {
        match s {
            LogStatus::Running => 0,
            LogStatus::Success => 1,
            LogStatus::Failed => 2,
        }
    }
}

impl TryFrom<i32> for LogStatus {
    type Error = DomainError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(LogStatus::Running),
            1 => Ok(LogStatus::Success),
            2 => Ok(LogStatus::Failed),
            other => Err(DomainError::UnknownLogStatus(other)),
        }
    }
}

/// Correlation record for one in-flight dispatch.
///
/// `task_id` is 0 for instant tasks, which have no task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: u64,
    pub task_id: TaskId,
    pub correlation_token: String,
    pub task_type: TaskType,
    pub status: LogStatus,
    pub message: String,
    pub error_message: String,
}

impl TaskLog {
    /// Fresh log in Running state, created at publish time.
    pub fn running(task_id: TaskId, correlation_token: String, task_type: TaskType) -> Self {
        Self {
            id: 0,
            task_id,
            correlation_token,
            task_type,
            status: LogStatus::Running,
            message: String::new(),
            error_message: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_status_codes_round_trip() {
        for (code, status) in [
            (0, LogStatus::Running),
            (1, LogStatus::Success),
            (2, LogStatus::Failed),
        ] {
            assert_eq!(i32::from(status), code);
            assert_eq!(LogStatus::try_from(code).unwrap(), status);
        }
        assert!(LogStatus::try_from(3).is_err());
    }

    #[test]
    fn fresh_log_is_running_and_not_terminal() {
        let log = TaskLog::running(9, "tok".into(), TaskType::Explore);
        assert_eq!(log.status, LogStatus::Running);
        assert!(!log.is_terminal());
        assert!(LogStatus::Failed.is_terminal());
        assert!(LogStatus::Success.is_terminal());
    }
}
