// Port Layer - Interfaces for external dependencies

pub mod broker;
pub mod task_repository;
pub mod time_provider;
pub mod token_provider;

// Re-exports
pub use broker::Broker;
pub use task_repository::{
    AccountRepository, DispatchTransaction, ReconcileTransaction, TaskLogRepository,
    TaskRepository, Transaction, TransactionalTaskRepository,
};
pub use time_provider::TimeProvider;
pub use token_provider::TokenProvider;
