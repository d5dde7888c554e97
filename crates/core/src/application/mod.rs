// Application Layer - Scheduling services and use cases

pub mod constants;
pub mod generator;
pub mod instant;
pub mod reconciler;
pub mod shutdown;
pub mod tasks;

// Re-exports
pub use generator::{GeneratorConfig, TaskGenerator};
pub use instant::{InstantOutcome, InstantTaskService, PlanetIdLookup};
pub use reconciler::{ReconcilerConfig, ResultReconciler};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use tasks::{NewTask, TaskCommandService, TaskPatch};
