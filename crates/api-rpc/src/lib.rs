//! JSON-RPC API Layer
//!
//! Localhost control surface of the Courier daemon: manual triggers, task
//! history, log queries, schedule sync, credential checks and status.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::{RpcContext, RpcHandler};
pub use server::{RpcServer, RpcServerConfig};
