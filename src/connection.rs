//! Length-delimited framing over a byte stream.
//!
//! Every envelope travels as one frame: a big-endian `u32` length followed by
//! that many bytes of bincode.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::errors::RpcError;

#[async_trait]
pub trait FrameAdapter: Send {
    async fn send_frame(&mut self, data: Bytes) -> Result<(), RpcError>;

    /// Returns `Ok(None)` once the peer has closed its side.
    async fn receive_frame(&mut self) -> Result<Option<Bytes>, RpcError>;
}

#[async_trait]
impl<T> FrameAdapter for Box<T>
where
    T: FrameAdapter + ?Sized,
{
    async fn send_frame(&mut self, data: Bytes) -> Result<(), RpcError> {
        (**self).send_frame(data).await
    }

    async fn receive_frame(&mut self) -> Result<Option<Bytes>, RpcError> {
        (**self).receive_frame().await
    }
}

pub struct FramedConnection<T> {
    inner: Framed<T, LengthDelimitedCodec>,
}

impl<T> FramedConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: T, max_frame_length: usize) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(max_frame_length)
            .new_codec();
        Self {
            inner: Framed::new(io, codec),
        }
    }
}

#[async_trait]
impl<T> FrameAdapter for FramedConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_frame(&mut self, data: Bytes) -> Result<(), RpcError> {
        self.inner
            .send(data)
            .await
            .map_err(|e| RpcError::StreamError(e.to_string()))
    }

    async fn receive_frame(&mut self) -> Result<Option<Bytes>, RpcError> {
        match self.inner.next().await {
            Some(Ok(frame)) => Ok(Some(frame.freeze())),
            Some(Err(e)) => Err(RpcError::StreamError(e.to_string())),
            None => Ok(None),
        }
    }
}
