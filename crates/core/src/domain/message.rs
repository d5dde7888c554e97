// Wire Values
// JSON payloads exchanged with the external worker pool over the broker.
// Field names are protocol, not style: do not rename.

use serde::{Deserialize, Serialize};

use crate::domain::account::AccountSnapshot;
use crate::domain::fleet::Fleet;
use crate::domain::task::{Target, TaskId, TaskType};
use crate::domain::task_log::LogStatus;

/// One dispatched unit of work. Constructed fresh for every dispatch and
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub task_id: TaskId,
    pub correlation_token: String,
    pub name: String,
    /// Scheduled epoch seconds.
    pub next_start: i64,
    pub enabled: bool,
    pub account: AccountSnapshot,
    pub task_type: TaskType,
    pub target: Target,
    pub repeat: i32,
    pub fleet: Fleet,
}

/// Worker-reported outcome of one work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub correlation_token: String,
    pub status: LogStatus,
    pub task_type: TaskType,
    /// Epoch seconds at which the worker finished; basis for rescheduling.
    pub completed_at: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_item_wire_shape() {
        let item = WorkItem {
            task_id: 12,
            correlation_token: "2c1f".to_string(),
            name: "expedition".to_string(),
            next_start: 1_700_000_123,
            enabled: true,
            account: AccountSnapshot {
                username: "cmdr".to_string(),
                password: "pw".to_string(),
                server: "andromeda-3".to_string(),
            },
            task_type: TaskType::Explore,
            target: Target::new(2, 144, 9, false),
            repeat: 3,
            fleet: Fleet {
                lf: 100,
                ..Fleet::default()
            },
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["task_id"], 12);
        assert_eq!(value["correlation_token"], "2c1f");
        assert_eq!(value["task_type"], 4);
        assert_eq!(value["account"]["server"], "andromeda-3");
        assert_eq!(value["target"]["galaxy"], 2);
        assert_eq!(value["target"]["is_moon"], false);
        assert_eq!(value["fleet"]["lf"], 100);

        let back: WorkItem = serde_json::from_value(value).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn task_result_accepts_missing_messages() {
        let raw = r#"{
            "task_id": 7,
            "correlation_token": "ab",
            "status": 2,
            "task_type": 4,
            "completed_at": 1700000500
        }"#;
        let result: TaskResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.status, LogStatus::Failed);
        assert_eq!(result.task_type, TaskType::Explore);
        assert!(result.message.is_empty());
        assert!(result.error_message.is_empty());
    }
}
