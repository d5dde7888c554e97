//! RPC Method Handlers
//!
//! Thin layer over the application services: rate limit, translate the
//! wire types, map errors.

use std::sync::Arc;

use jsonrpsee::types::ErrorObjectOwned;
use tracing::debug;

use armada_core::application::instant::{InstantOutcome, InstantTaskService};
use armada_core::application::tasks::{NewTask, TaskCommandService, TaskPatch};
use armada_core::domain::TaskType;
use armada_core::error::AppError;
use armada_core::port::AccountRepository;

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    AddTaskRequest, AddTaskResponse, CheckLoginRequest, CheckLoginResponse, DeleteTaskRequest,
    DeleteTaskResponse, GetTaskRequest, GetTaskResponse, ListTasksRequest, ListTasksResponse,
    LoginInfoRequest, LoginInfoResponse, PlanetIdRequest, PlanetIdResponse, QueryPlanetRequest,
    QueryPlanetResponse, UpdateTaskRequest, UpdateTaskResponse,
};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    commands: Arc<TaskCommandService>,
    instant: Arc<InstantTaskService>,
    accounts: Arc<dyn AccountRepository>,
    rate_limiter: RateLimiter,
}

impl RpcHandler {
    pub fn new(
        commands: Arc<TaskCommandService>,
        instant: Arc<InstantTaskService>,
        accounts: Arc<dyn AccountRepository>,
    ) -> Self {
        let max_burst: u32 = std::env::var("ARMADA_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        let rate_per_sec: u32 = std::env::var("ARMADA_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            commands,
            instant,
            accounts,
            rate_limiter: RateLimiter::new(max_burst, rate_per_sec),
        }
    }

    async fn guard(&self) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.check().await {
            Ok(())
        } else {
            Err(throttled())
        }
    }

    /// task.add.v1
    pub async fn add_task(
        &self,
        params: AddTaskRequest,
    ) -> Result<AddTaskResponse, ErrorObjectOwned> {
        self.guard().await?;

        let task_type = TaskType::try_from(params.task_type)
            .map_err(|e| to_rpc_error(AppError::Domain(e)))?;
        let task_id = self
            .commands
            .add_task(NewTask {
                name: params.name,
                account_id: params.account_id,
                task_type,
                next_start: params.next_start,
                enabled: params.enabled,
                targets: params.targets,
                repeat: params.repeat,
                fleet: params.fleet,
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(AddTaskResponse { task_id })
    }

    /// task.update.v1
    pub async fn update_task(
        &self,
        params: UpdateTaskRequest,
    ) -> Result<UpdateTaskResponse, ErrorObjectOwned> {
        self.guard().await?;

        let task_type = params
            .task_type
            .map(TaskType::try_from)
            .transpose()
            .map_err(|e| to_rpc_error(AppError::Domain(e)))?;

        let task = self
            .commands
            .update_task(
                params.task_id,
                TaskPatch {
                    name: params.name,
                    next_start: params.next_start,
                    enabled: params.enabled,
                    task_type,
                    targets: params.targets,
                    repeat: params.repeat,
                    fleet: params.fleet,
                },
            )
            .await
            .map_err(to_rpc_error)?;

        Ok(UpdateTaskResponse { task })
    }

    /// task.delete.v1
    pub async fn delete_task(
        &self,
        params: DeleteTaskRequest,
    ) -> Result<DeleteTaskResponse, ErrorObjectOwned> {
        self.guard().await?;

        self.commands
            .delete_task(params.task_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(DeleteTaskResponse {
            task_id: params.task_id,
            deleted: true,
        })
    }

    /// task.get.v1
    pub async fn get_task(
        &self,
        params: GetTaskRequest,
    ) -> Result<GetTaskResponse, ErrorObjectOwned> {
        self.guard().await?;

        let task = self
            .commands
            .get_task(params.task_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(GetTaskResponse { task })
    }

    /// task.list.v1
    pub async fn list_tasks(
        &self,
        params: ListTasksRequest,
    ) -> Result<ListTasksResponse, ErrorObjectOwned> {
        self.guard().await?;

        let tasks = self
            .commands
            .list_tasks(params.account_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(ListTasksResponse { tasks })
    }

    /// instant.check_login.v1
    pub async fn check_login(
        &self,
        params: CheckLoginRequest,
    ) -> Result<CheckLoginResponse, ErrorObjectOwned> {
        self.guard().await?;
        debug!(account_id = params.account_id, "login check requested");

        let account = self
            .accounts
            .find_account(params.account_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "account {}",
                    params.account_id
                )))
            })?;

        let token = self
            .instant
            .check_login(&account)
            .await
            .map_err(to_rpc_error)?;
        Ok(CheckLoginResponse { token })
    }

    /// instant.query_planet.v1
    pub async fn query_planet(
        &self,
        params: QueryPlanetRequest,
    ) -> Result<QueryPlanetResponse, ErrorObjectOwned> {
        self.guard().await?;

        let token = self
            .instant
            .query_planet_id(params.account_id, &params.target)
            .await
            .map_err(to_rpc_error)?;
        Ok(QueryPlanetResponse { token })
    }

    /// instant.login_info.v1
    pub async fn login_info(
        &self,
        params: LoginInfoRequest,
    ) -> Result<LoginInfoResponse, ErrorObjectOwned> {
        self.guard().await?;

        let outcome = self
            .instant
            .login_outcome(&params.token)
            .await
            .map_err(to_rpc_error)?;
        Ok(LoginInfoResponse {
            processing: outcome == InstantOutcome::Processing,
            succeeded: outcome == InstantOutcome::Succeeded,
        })
    }

    /// instant.planet_id.v1
    pub async fn planet_id(
        &self,
        params: PlanetIdRequest,
    ) -> Result<PlanetIdResponse, ErrorObjectOwned> {
        self.guard().await?;

        let lookup = self
            .instant
            .planet_id_outcome(&params.token)
            .await
            .map_err(to_rpc_error)?;
        Ok(PlanetIdResponse {
            processing: lookup.outcome == InstantOutcome::Processing,
            succeeded: lookup.outcome == InstantOutcome::Succeeded,
            planet_id: lookup.planet_id,
        })
    }
}
