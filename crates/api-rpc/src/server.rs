//! JSON-RPC Server
//!
//! HTTP transport bound to the loopback interface only.

use crate::error::StartError;
use crate::handler::{RpcContext, RpcHandler};
use crate::rate_limiter::{RateLimiter, DEFAULT_BURST, DEFAULT_RATE_PER_SEC};
use crate::types::{CheckCredentialRequest, LogsRequest, RunJobRequest, SyncRequest, TasksRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9627;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: u32,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rate_limit_burst: DEFAULT_BURST,
            rate_limit_per_sec: DEFAULT_RATE_PER_SEC,
        }
    }
}

impl RpcServerConfig {
    fn is_loopback(&self) -> bool {
        self.host == "localhost"
            || self
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false)
    }
}

pub struct RpcServer {
    config: RpcServerConfig,
    handler: RpcHandler,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, ctx: RpcContext) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_burst, config.rate_limit_per_sec);
        Self {
            config,
            handler: RpcHandler::new(ctx, limiter),
        }
    }

    /// Bind and start serving; the server stops when the handle is stopped or dropped
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), StartError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        if !self.config.is_loopback() {
            return Err(StartError::Bind {
                addr,
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "the control surface only binds to loopback addresses",
                ),
            });
        }

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|source| StartError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = server.local_addr().map_err(|source| StartError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let module = build_module(self.handler)?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server listening");
        Ok((handle, local_addr))
    }
}

fn register_error(e: impl std::fmt::Display) -> StartError {
    StartError::Register(e.to_string())
}

fn build_module(handler: RpcHandler) -> Result<RpcModule<RpcHandler>, StartError> {
    let mut module = RpcModule::new(handler);

    module
        .register_async_method("job.run.v1", |params, handler, _| async move {
            let req: RunJobRequest = params.parse()?;
            handler.run_job(req).await
        })
        .map_err(register_error)?;

    module
        .register_async_method("job.tasks.v1", |params, handler, _| async move {
            let req: TasksRequest = params.parse()?;
            handler.tasks(req).await
        })
        .map_err(register_error)?;

    module
        .register_async_method("job.logs.v1", |params, handler, _| async move {
            let req: LogsRequest = params.parse()?;
            handler.logs(req).await
        })
        .map_err(register_error)?;

    module
        .register_async_method("schedule.sync.v1", |params, handler, _| async move {
            // Params are optional: a bare call reloads every trigger
            let req: SyncRequest = params.parse::<Option<SyncRequest>>()?.unwrap_or_default();
            handler.sync(req).await
        })
        .map_err(register_error)?;

    module
        .register_async_method("credential.check.v1", |params, handler, _| async move {
            let req: CheckCredentialRequest = params.parse()?;
            handler.check_credential(req).await
        })
        .map_err(register_error)?;

    module
        .register_async_method("admin.status.v1", |_, handler, _| async move {
            handler.status().await
        })
        .map_err(register_error)?;

    Ok(module)
}
