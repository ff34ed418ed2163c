use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use super::FileService;
use crate::config::RpcConfig;
use crate::errors::RpcError;
use crate::protocol::{
    CloseRequest, OpenRequest, ReadRequest, WriteRequest, CLOSE_METHOD, OPEN_METHOD, READ_METHOD,
    WRITE_METHOD,
};
use crate::server::RpcServer;

/// Binds a [`FileService`] to the RPC transport.
pub struct FileServer {
    service: Arc<FileService>,
    rpc_server: RpcServer,
}

impl FileServer {
    pub fn new(service: Arc<FileService>, config: RpcConfig) -> Self {
        Self {
            service,
            rpc_server: RpcServer::new(config),
        }
    }

    pub fn service(&self) -> &Arc<FileService> {
        &self.service
    }

    pub fn rpc_server(&self) -> &RpcServer {
        &self.rpc_server
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.rpc_server.socket_addr
    }

    /// Registers the four procedures with the RPC server, and releases a
    /// connection's handles when it closes.
    pub async fn register_all(&self) {
        let service = self.service.clone();
        self.rpc_server
            .register_typed_with_session(OPEN_METHOD, move |session, request: OpenRequest| {
                let service = service.clone();
                async move { Ok(service.open_file(session, request).await) }
            })
            .await;

        let service = self.service.clone();
        self.rpc_server
            .register_typed_with_session(READ_METHOD, move |session, request: ReadRequest| {
                let service = service.clone();
                async move { Ok(service.read_file(session, request).await) }
            })
            .await;

        let service = self.service.clone();
        self.rpc_server
            .register_typed_with_session(WRITE_METHOD, move |session, request: WriteRequest| {
                let service = service.clone();
                async move { Ok(service.write_file(session, request).await) }
            })
            .await;

        let service = self.service.clone();
        self.rpc_server
            .register_typed_with_session(CLOSE_METHOD, move |session, request: CloseRequest| {
                let service = service.clone();
                async move { Ok(service.close_file(session, request).await) }
            })
            .await;

        let service = self.service.clone();
        self.rpc_server
            .on_disconnect(move |session| {
                let service = service.clone();
                async move {
                    let released = service.release_session(session).await;
                    if released > 0 {
                        info!("released {released} handle(s) left open by {session}");
                    }
                }
            })
            .await;
    }

    pub async fn bind(&mut self) -> Result<TcpListener, RpcError> {
        self.register_all().await;
        self.rpc_server.bind().await
    }

    pub async fn start(&mut self, listener: TcpListener) -> Result<(), RpcError> {
        self.rpc_server.start(listener).await
    }

    /// Registers, binds and serves until the listener fails.
    pub async fn serve(mut self) -> Result<(), RpcError> {
        let listener = self.bind().await?;
        info!("file service listening on {:?}", self.local_addr());
        self.start(listener).await
    }
}
