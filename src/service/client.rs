use std::net::SocketAddr;

use async_trait::async_trait;

use super::RemoteFiles;
use crate::client::RpcClient;
use crate::config::RpcConfig;
use crate::errors::RpcError;
use crate::protocol::{
    CloseReply, CloseRequest, OpenReply, OpenRequest, ReadReply, ReadRequest, WriteReply,
    WriteRequest, CLOSE_METHOD, OPEN_METHOD, READ_METHOD, WRITE_METHOD,
};

/// Calls the file procedures on a remote [`FileServer`](super::FileServer).
pub struct FileClient {
    inner: RpcClient,
}

impl FileClient {
    pub async fn connect(addr: SocketAddr, config: RpcConfig) -> Result<Self, RpcError> {
        let inner = RpcClient::connect(addr, config).await?;
        Ok(Self { inner })
    }

    pub fn from_rpc(inner: RpcClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RemoteFiles for FileClient {
    async fn open(&self, request: OpenRequest) -> Result<OpenReply, RpcError> {
        self.inner.call_typed(OPEN_METHOD, &request).await
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadReply, RpcError> {
        self.inner.call_typed(READ_METHOD, &request).await
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteReply, RpcError> {
        self.inner.call_typed(WRITE_METHOD, &request).await
    }

    async fn close(&self, request: CloseRequest) -> Result<CloseReply, RpcError> {
        self.inner.call_typed(CLOSE_METHOD, &request).await
    }
}
