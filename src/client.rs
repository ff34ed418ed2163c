use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::Mutex,
};
use tracing::debug;

use crate::{
    config::RpcConfig,
    connection::{FrameAdapter, FramedConnection},
    errors::RpcError,
    request::RpcRequest,
    response::RpcResponse,
};

/// Caller side of the transport.
///
/// Calls are serialized: the connection lock is held from sending a request
/// until its reply (or the timeout) arrives.
pub struct RpcClient {
    connection: Mutex<Box<dyn FrameAdapter + Send>>,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl RpcClient {
    pub async fn connect(connect_addr: SocketAddr, config: RpcConfig) -> Result<Self, RpcError> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(connect_addr))
            .await
            .map_err(|_| RpcError::ConnectionError(format!("timed out connecting to {connect_addr}")))?
            .map_err(|e| RpcError::ConnectionError(e.to_string()))?;
        stream.set_nodelay(true)?;
        Ok(Self::with_io(stream, config))
    }

    /// Wraps an already-established byte stream.
    pub fn with_io<T>(io: T, config: RpcConfig) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection = FramedConnection::new(io, config.max_frame_length);
        Self {
            connection: Mutex::new(Box::new(connection)),
            config,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub async fn call(&self, method: &str, params: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req_data = bincode::serialize(&RpcRequest::new(id, method.to_string(), params))?;

        let mut connection = self.connection.lock().await;
        let exchange = Self::exchange(&mut **connection, id, Bytes::from(req_data));

        match tokio::time::timeout(self.config.call_timeout, exchange).await {
            Ok(res) => res,
            Err(_) => Err(RpcError::Timeout),
        }
    }

    async fn exchange(
        connection: &mut (dyn FrameAdapter + Send),
        id: u64,
        req_data: Bytes,
    ) -> Result<Vec<u8>, RpcError> {
        connection.send_frame(req_data).await?;
        loop {
            let frame = connection
                .receive_frame()
                .await?
                .ok_or_else(|| RpcError::ConnectionError("Stream closed unexpectedly".into()))?;
            let response: RpcResponse = bincode::deserialize(&frame)?;
            if response.id() == id {
                return response.into_result();
            }
            // Left over from a call that already timed out.
            debug!("discarding stale response {} while waiting for {id}", response.id());
        }
    }

    pub async fn call_typed<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let params = bincode::serialize(request)?;
        let response_data = self.call(method, params).await?;
        Ok(bincode::deserialize(&response_data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn call_times_out_when_peer_never_answers() {
        let (client_io, mut server_io) = tokio::io::duplex(4096);
        let config = RpcConfig::new("127.0.0.1:0").with_call_timeout(Duration::from_millis(50));
        let client = RpcClient::with_io(client_io, config);

        let drain = tokio::spawn(async move {
            let mut sink = Vec::new();
            let _ = tokio::io::AsyncReadExt::read_to_end(&mut server_io, &mut sink).await;
        });

        let result = client.call("anything", vec![]).await;
        assert!(matches!(result, Err(RpcError::Timeout)));
        drop(client);
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn stale_responses_are_skipped() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let client = RpcClient::with_io(client_io, RpcConfig::new("127.0.0.1:0"));

        let peer = tokio::spawn(async move {
            let mut conn = FramedConnection::new(server_io, 4096);
            let frame = conn.receive_frame().await.unwrap().unwrap();
            let request: RpcRequest = bincode::deserialize(&frame).unwrap();
            let stale = RpcResponse::new(request.id() + 100, Some(vec![0]), None);
            let fresh = RpcResponse::new(request.id(), Some(vec![1, 2]), None);
            for resp in [stale, fresh] {
                conn.send_frame(Bytes::from(bincode::serialize(&resp).unwrap()))
                    .await
                    .unwrap();
            }
        });

        let result = client.call("m", vec![]).await.unwrap();
        assert_eq!(result, vec![1, 2]);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn closed_peer_fails_the_call() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        drop(server_io);
        let client = RpcClient::with_io(client_io, RpcConfig::new("127.0.0.1:0"));

        let result = client.call("m", vec![]).await;
        assert!(result.is_err());
    }
}
