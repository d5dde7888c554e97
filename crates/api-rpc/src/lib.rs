//! JSON-RPC API Layer
//!
//! The collaborator surface consumed by the external HTTP gateway: task
//! CRUD plus the instant dispatch/poll flows. Permission evaluation stays
//! in the gateway; this layer only validates shape and rate.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
