//! JSON-RPC Server
//!
//! Serves the `queue.*.v1` methods over HTTP for remote workers.

use crate::handler::RpcHandler;
use crate::types::{
    ClaimRequest, CompleteRequest, FailRequest, ProgressRequest, StatsRequest, StatusRequest,
    SubmitRequest,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use renderq_core::application::QueueManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 8750;

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
    pub fn new(config: RpcServerConfig, queue_manager: Arc<QueueManager>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(queue_manager)),
        }
    }

    /// Start the JSON-RPC server.
    ///
    /// Returns the bound address (port 0 binds an ephemeral port) and
    /// the handle that keeps the server alive.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to resolve bound address: {}", e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("queue.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SubmitRequest = params.one()?;
                    handler.submit(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.claim.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ClaimRequest = params.one()?;
                    handler.claim(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.progress.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ProgressRequest = params.one()?;
                    handler.progress(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.complete.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CompleteRequest = params.one()?;
                    handler.complete(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.fail.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: FailRequest = params.one()?;
                    handler.fail(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatusRequest = params.one()?;
                    handler.status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatsRequest = params.parse().unwrap_or(StatsRequest {});
                    handler.stats(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, "JSON-RPC server started");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }
}
