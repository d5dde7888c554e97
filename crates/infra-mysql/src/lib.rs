// Armada Infrastructure - MySQL Adapter
// Implements: AccountRepository, TaskRepository, TaskLogRepository,
// TransactionalTaskRepository (row-locked dispatch + reconcile)

mod connection;
mod migration;
mod task_repository;
mod transaction;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use task_repository::MySqlTaskRepository;
pub use transaction::{MySqlDispatchTransaction, MySqlReconcileTransaction};

// Note: sqlx::Error conversion is wrapped in helper functions because of
// Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here).
