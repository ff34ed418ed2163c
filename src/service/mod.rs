//! The remote file service: the four procedures, their RPC binding, and the
//! caller-side stub.

use async_trait::async_trait;

use crate::errors::RpcError;
use crate::protocol::{
    CloseReply, CloseRequest, OpenReply, OpenRequest, ReadReply, ReadRequest, WriteReply,
    WriteRequest,
};

pub mod client;
pub mod files;
pub mod server;

pub use client::FileClient;
pub use files::FileService;
pub use server::FileServer;

/// The procedure set as seen by a caller.
///
/// `Err` means no reply was obtained (transport failure or timeout); a reply
/// with `Status::Failed` is still `Ok`.
#[async_trait]
pub trait RemoteFiles: Send + Sync {
    async fn open(&self, request: OpenRequest) -> Result<OpenReply, RpcError>;

    async fn read(&self, request: ReadRequest) -> Result<ReadReply, RpcError>;

    async fn write(&self, request: WriteRequest) -> Result<WriteReply, RpcError>;

    async fn close(&self, request: CloseRequest) -> Result<CloseReply, RpcError>;
}

#[async_trait]
impl<T> RemoteFiles for std::sync::Arc<T>
where
    T: RemoteFiles + ?Sized,
{
    async fn open(&self, request: OpenRequest) -> Result<OpenReply, RpcError> {
        (**self).open(request).await
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadReply, RpcError> {
        (**self).read(request).await
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteReply, RpcError> {
        (**self).write(request).await
    }

    async fn close(&self, request: CloseRequest) -> Result<CloseReply, RpcError> {
        (**self).close(request).await
    }
}
