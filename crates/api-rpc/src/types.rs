//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results. Targets and fleets reuse the
//! domain wire representation.

use armada_core::domain::{Fleet, Target, Task};
use serde::{Deserialize, Serialize};

/// task.add.v1 - Create a recurring task
#[derive(Debug, Deserialize)]
pub struct AddTaskRequest {
    pub name: String,
    pub account_id: u64,
    pub task_type: i32,
    #[serde(default)]
    pub next_start: i64,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub repeat: i32,
    #[serde(default)]
    pub fleet: Fleet,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddTaskResponse {
    pub task_id: u64,
}

/// task.update.v1 - Partial update; absent fields stay untouched
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub task_id: u64,
    pub name: Option<String>,
    pub next_start: Option<i64>,
    pub enabled: Option<bool>,
    pub task_type: Option<i32>,
    pub targets: Option<Vec<Target>>,
    pub repeat: Option<i32>,
    pub fleet: Option<Fleet>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateTaskResponse {
    pub task: Task,
}

/// task.delete.v1
#[derive(Debug, Deserialize)]
pub struct DeleteTaskRequest {
    pub task_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteTaskResponse {
    pub task_id: u64,
    pub deleted: bool,
}

/// task.get.v1
#[derive(Debug, Deserialize)]
pub struct GetTaskRequest {
    pub task_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetTaskResponse {
    pub task: Task,
}

/// task.list.v1 - All tasks of one account
#[derive(Debug, Deserialize)]
pub struct ListTasksRequest {
    pub account_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<Task>,
}

/// instant.check_login.v1 - Verify credentials now
#[derive(Debug, Deserialize)]
pub struct CheckLoginRequest {
    pub account_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckLoginResponse {
    pub token: String,
}

/// instant.query_planet.v1 - Resolve a coordinate's planet id now
#[derive(Debug, Deserialize)]
pub struct QueryPlanetRequest {
    pub account_id: u64,
    pub target: Target,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryPlanetResponse {
    pub token: String,
}

/// instant.login_info.v1 - Poll a login check
#[derive(Debug, Deserialize)]
pub struct LoginInfoRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginInfoResponse {
    pub processing: bool,
    pub succeeded: bool,
}

/// instant.planet_id.v1 - Poll a planet-id lookup
#[derive(Debug, Deserialize)]
pub struct PlanetIdRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanetIdResponse {
    pub processing: bool,
    pub succeeded: bool,
    pub planet_id: Option<i64>,
}
