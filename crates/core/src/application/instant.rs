//! Instant Tasks
//!
//! One-off, non-recurring dispatches with no task row: credential checks
//! and planet-ID lookups. The caller gets a correlation token back and
//! polls the outcome through the read-only accessors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use crate::application::constants::TASK_QUEUE;
use crate::domain::{
    Account, AccountId, Fleet, LogStatus, Target, TaskLog, TaskType, WorkItem,
};
use crate::error::{AppError, Result};
use crate::port::{
    AccountRepository, Broker, TaskLogRepository, TimeProvider, TokenProvider,
    TransactionalTaskRepository,
};

/// Poll-visible state of an instant task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantOutcome {
    Processing,
    Succeeded,
    Failed,
}

impl From<LogStatus> for InstantOutcome {
    fn from(status: LogStatus) -> Self {
        match status {
            LogStatus::Running => InstantOutcome::Processing,
            LogStatus::Success => InstantOutcome::Succeeded,
            LogStatus::Failed => InstantOutcome::Failed,
        }
    }
}

/// Outcome of a planet-ID lookup; the id is present only once succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanetIdLookup {
    pub outcome: InstantOutcome,
    pub planet_id: Option<i64>,
}

pub struct InstantTaskService {
    tx_repo: Arc<dyn TransactionalTaskRepository>,
    logs: Arc<dyn TaskLogRepository>,
    accounts: Arc<dyn AccountRepository>,
    broker: Arc<dyn Broker>,
    tokens: Arc<dyn TokenProvider>,
    clock: Arc<dyn TimeProvider>,
}

impl InstantTaskService {
    pub fn new(
        tx_repo: Arc<dyn TransactionalTaskRepository>,
        logs: Arc<dyn TaskLogRepository>,
        accounts: Arc<dyn AccountRepository>,
        broker: Arc<dyn Broker>,
        tokens: Arc<dyn TokenProvider>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            tx_repo,
            logs,
            accounts,
            broker,
            tokens,
            clock,
        }
    }

    /// Verify the account's credentials against the game server now.
    /// Returns the correlation token to poll with.
    pub async fn check_login(&self, account: &Account) -> Result<String> {
        self.dispatch(account, TaskType::Login, Target::default())
            .await
    }

    /// Resolve the numeric planet id behind a coordinate now.
    pub async fn query_planet_id(&self, account_id: AccountId, target: &Target) -> Result<String> {
        let account = self
            .accounts
            .find_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {account_id}")))?;
        self.dispatch(&account, TaskType::QueryPlanetId, target.clone())
            .await
    }

    /// Create the correlation record and publish the one-off work item in
    /// one unit: a failed publish rolls the record back so no orphaned log
    /// survives.
    async fn dispatch(
        &self,
        account: &Account,
        task_type: TaskType,
        target: Target,
    ) -> Result<String> {
        let token = self.tokens.mint();
        info!(
            correlation_token = %token,
            task_type = i32::from(task_type),
            account_id = account.id,
            "dispatching instant task"
        );

        let item = WorkItem {
            task_id: 0,
            correlation_token: token.clone(),
            name: String::new(),
            next_start: self.clock.now_secs(),
            enabled: true,
            account: account.snapshot(),
            task_type,
            target,
            repeat: 0,
            fleet: Fleet::default(),
        };
        let body = serde_json::to_vec(&item)?;

        let mut tx = self.tx_repo.begin_dispatch().await?;
        if let Err(e) = tx
            .insert_log(&TaskLog::running(0, token.clone(), task_type))
            .await
        {
            let _ = tx.rollback().await;
            return Err(e);
        }
        if let Err(e) = self.broker.publish_now(body, TASK_QUEUE).await {
            error!(correlation_token = %token, error = %e, "instant publish failed");
            let _ = tx.rollback().await;
            return Err(e);
        }
        tx.commit().await?;

        info!(correlation_token = %token, "instant task published");
        Ok(token)
    }

    /// Side-effect-free poll of a login check.
    pub async fn login_outcome(&self, token: &str) -> Result<InstantOutcome> {
        let log = self.find_log(token).await?;
        Ok(log.status.into())
    }

    /// Side-effect-free poll of a planet-ID lookup. On success the stored
    /// result message is parsed as a string map carrying `planet_id`.
    pub async fn planet_id_outcome(&self, token: &str) -> Result<PlanetIdLookup> {
        let log = self.find_log(token).await?;
        let outcome = InstantOutcome::from(log.status);
        if outcome != InstantOutcome::Succeeded {
            return Ok(PlanetIdLookup {
                outcome,
                planet_id: None,
            });
        }

        if log.message.is_empty() {
            return Err(AppError::Validation(
                "planet-id result carried no payload".to_string(),
            ));
        }
        let data: HashMap<String, String> = serde_json::from_str(&log.message)?;
        let raw = data.get("planet_id").ok_or_else(|| {
            AppError::Validation("planet_id missing from result payload".to_string())
        })?;
        let planet_id = raw.parse::<i64>().map_err(|_| {
            AppError::Validation(format!("planet_id is not a number: {raw}"))
        })?;

        Ok(PlanetIdLookup {
            outcome,
            planet_id: Some(planet_id),
        })
    }

    async fn find_log(&self, token: &str) -> Result<TaskLog> {
        self.logs
            .find_log_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task log {token}")))
    }
}
