//! JSON-RPC Server
//!
//! TCP on localhost only; the external HTTP gateway is the sole intended
//! client.

use std::sync::Arc;

use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use tracing::info;

use armada_core::application::instant::InstantTaskService;
use armada_core::application::tasks::TaskCommandService;
use armada_core::port::AccountRepository;

use crate::handler::RpcHandler;
use crate::types::{
    AddTaskRequest, CheckLoginRequest, DeleteTaskRequest, GetTaskRequest, ListTasksRequest,
    LoginInfoRequest, PlanetIdRequest, QueryPlanetRequest, UpdateTaskRequest,
};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9530;

/// RPC Server Configuration
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        commands: Arc<TaskCommandService>,
        instant: Arc<InstantTaskService>,
        accounts: Arc<dyn AccountRepository>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(commands, instant, accounts)),
        }
    }

    /// Start the JSON-RPC server; returns a handle used to stop it.
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server on TCP (localhost only)"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {addr}: {e}"))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("task.add.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: AddTaskRequest = params.parse()?;
                    handler.add_task(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("task.update.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: UpdateTaskRequest = params.parse()?;
                    handler.update_task(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("task.delete.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DeleteTaskRequest = params.parse()?;
                    handler.delete_task(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("task.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: GetTaskRequest = params.parse()?;
                    handler.get_task(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("task.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListTasksRequest = params.parse()?;
                    handler.list_tasks(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("instant.check_login.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CheckLoginRequest = params.parse()?;
                    handler.check_login(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("instant.query_planet.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: QueryPlanetRequest = params.parse()?;
                    handler.query_planet(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("instant.login_info.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: LoginInfoRequest = params.parse()?;
                    handler.login_info(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("instant.planet_id.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PlanetIdRequest = params.parse()?;
                    handler.planet_id(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!("JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok(handle)
    }
}
