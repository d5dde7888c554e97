// Account Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::task::Task;

/// Account ID (database identity)
pub type AccountId = u64;

/// A managed game account.
///
/// Accounts whose `expire_at` has passed are invisible to the sweep; their
/// tasks stay untouched until the subscription is extended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub password: String,
    pub email: String,
    pub server: String,
    /// Epoch seconds after which the account is no longer swept.
    pub expire_at: i64,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Account {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
        server: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            username: username.into(),
            password: password.into(),
            email: email.into(),
            server: server.into(),
            expire_at: 0,
            tasks: Vec::new(),
        }
    }

    /// Credentials snapshot embedded in every dispatched work item.
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            username: self.username.clone(),
            password: self.password.clone(),
            server: self.server.clone(),
        }
    }
}

/// The subset of account data a worker needs to act on the game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub username: String,
    pub password: String,
    pub server: String,
}
