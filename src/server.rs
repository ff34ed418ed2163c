use std::{
    collections::HashMap,
    fmt,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::RwLock,
};
use tracing::{debug, info, warn};

use crate::{
    config::RpcConfig,
    connection::{FrameAdapter, FramedConnection},
    errors::RpcError,
    request::RpcRequest,
    response::RpcResponse,
};

/// Identifies one client connection for as long as it stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Reserved for in-process callers; connections are numbered from 1.
    pub const LOCAL: SessionId = SessionId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}", self.0)
    }
}

type AsyncHandlerFn = Box<
    dyn Fn(SessionId, Vec<u8>) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, RpcError>> + Send>>
        + Send
        + Sync,
>;

type HandlerMap = Arc<RwLock<HashMap<String, AsyncHandlerFn>>>;

type DisconnectFn =
    Box<dyn Fn(SessionId) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

type DisconnectHooks = Arc<RwLock<Vec<DisconnectFn>>>;

/// Method registry plus the accept loop that serves it.
#[derive(Clone)]
pub struct RpcServer {
    pub handlers: HandlerMap,

    pub socket_addr: Option<SocketAddr>,

    pub config: RpcConfig,

    disconnect_hooks: DisconnectHooks,

    next_session: Arc<AtomicU64>,
}

impl RpcServer {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            socket_addr: None,
            config,
            disconnect_hooks: Arc::new(RwLock::new(Vec::new())),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn register<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, RpcError>> + Send + 'static,
    {
        self.register_with_session(method, move |_session, params| handler(params))
            .await;
    }

    /// Like [`register`](Self::register), but the handler also learns which
    /// connection the call arrived on.
    pub async fn register_with_session<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(SessionId, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>, RpcError>> + Send + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(
            method.to_string(),
            Box::new(move |session: SessionId, params: Vec<u8>| {
                Box::pin(handler(session, params)) as Pin<Box<dyn Future<Output = _> + Send>>
            }),
        );
    }

    pub async fn register_typed<Req, Resp, F, Fut>(&self, method: &str, handler: F)
    where
        Req: serde::de::DeserializeOwned + Send + 'static,
        Resp: serde::Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        self.register_typed_with_session(method, move |_session, request: Req| handler(request))
            .await;
    }

    pub async fn register_typed_with_session<Req, Resp, F, Fut>(&self, method: &str, handler: F)
    where
        Req: serde::de::DeserializeOwned + Send + 'static,
        Resp: serde::Serialize + Send + 'static,
        F: Fn(SessionId, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register_with_session(method, move |session, params: Vec<u8>| {
            let handler = handler.clone();
            async move {
                let request: Req = bincode::deserialize(&params)?;
                let response = handler(session, request).await?;
                Ok(bincode::serialize(&response)?)
            }
        })
        .await;
    }

    /// Runs `hook` once for every connection after it has closed and its last
    /// request has been answered.
    pub async fn on_disconnect<F, Fut>(&self, hook: F)
    where
        F: Fn(SessionId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.disconnect_hooks.write().await.push(Box::new(move |session| {
            Box::pin(hook(session)) as Pin<Box<dyn Future<Output = ()> + Send>>
        }));
    }

    pub async fn bind(&mut self) -> Result<TcpListener, RpcError> {
        let listener = TcpListener::bind(self.config.bind_address.as_str())
            .await
            .map_err(|e| {
                RpcError::ConfigError(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })?;
        self.socket_addr = Some(listener.local_addr()?);
        Ok(listener)
    }

    /// Accepts connections until the listener fails. Each connection is
    /// served on its own task.
    pub async fn start(&mut self, listener: TcpListener) -> Result<(), RpcError> {
        loop {
            let (socket, peer) = listener.accept().await?;
            let session = self.next_session();
            info!("accepted connection from {peer} as {session}");
            let handlers = self.handlers.clone();
            let hooks = self.disconnect_hooks.clone();
            let max_frame_length = self.config.max_frame_length;

            tokio::spawn(async move {
                let connection = FramedConnection::new(socket, max_frame_length);
                Self::drive_connection(handlers, session, connection).await;
                debug!("connection from {peer} closed");
                Self::run_disconnect_hooks(&hooks, session).await;
            });
        }
    }

    /// Serves one already-established byte stream until the peer hangs up.
    pub async fn serve_io<T>(&self, io: T)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let session = self.next_session();
        let connection = FramedConnection::new(io, self.config.max_frame_length);
        Self::drive_connection(self.handlers.clone(), session, connection).await;
        Self::run_disconnect_hooks(&self.disconnect_hooks, session).await;
    }

    fn next_session(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    async fn run_disconnect_hooks(hooks: &DisconnectHooks, session: SessionId) {
        for hook in hooks.read().await.iter() {
            hook(session).await;
        }
    }

    /// Requests on one connection are answered strictly in arrival order.
    async fn drive_connection<C>(handlers: HandlerMap, session: SessionId, mut connection: C)
    where
        C: FrameAdapter,
    {
        loop {
            let frame = match connection.receive_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("dropping {session}: {e}");
                    break;
                }
            };

            let request: RpcRequest = match bincode::deserialize(&frame) {
                Ok(request) => request,
                Err(e) => {
                    warn!("undecodable request ({} bytes): {e}", frame.len());
                    break;
                }
            };

            let response = Self::dispatch(&handlers, session, request).await;
            let response_data = match bincode::serialize(&response) {
                Ok(data) => data,
                Err(e) => {
                    warn!("failed to encode response {}: {e}", response.id());
                    break;
                }
            };

            if let Err(e) = connection.send_frame(Bytes::from(response_data)).await {
                warn!("failed to send response: {e}");
                break;
            }
        }
    }

    async fn dispatch(handlers: &HandlerMap, session: SessionId, request: RpcRequest) -> RpcResponse {
        debug!("{session} request {} -> {}", request.id(), request.method());
        let handlers = handlers.read().await;
        match handlers.get(request.method()) {
            Some(handler) => {
                let id = request.id();
                let result = handler(session, request.into_params()).await;
                RpcResponse::from_result(id, result)
            }
            None => RpcResponse::from_result(
                request.id(),
                Err(RpcError::UnknownMethod(request.method().to_string())),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::FramedConnection;

    async fn roundtrip(server: &RpcServer, request: RpcRequest) -> RpcResponse {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = server.clone();
        let task = tokio::spawn(async move { server.serve_io(server_io).await });

        let mut client = FramedConnection::new(client_io, 4096);
        client
            .send_frame(Bytes::from(bincode::serialize(&request).unwrap()))
            .await
            .unwrap();
        let frame = client.receive_frame().await.unwrap().unwrap();
        drop(client);
        task.await.unwrap();
        bincode::deserialize(&frame).unwrap()
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let server = RpcServer::new(RpcConfig::new("127.0.0.1:0"));
        server.register("echo", |params| async move { Ok(params) }).await;

        let resp = roundtrip(&server, RpcRequest::new(9, "echo".into(), vec![1, 2, 3])).await;
        assert_eq!(resp.id(), 9);
        assert_eq!(resp.result(), Some(&vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn unknown_method_yields_error_envelope() {
        let server = RpcServer::new(RpcConfig::new("127.0.0.1:0"));

        let resp = roundtrip(&server, RpcRequest::new(3, "missing".into(), vec![])).await;
        assert_eq!(resp.id(), 3);
        assert_eq!(resp.error(), Some(&"Unknown method: missing".to_string()));
    }

    #[tokio::test]
    async fn typed_handler_rejects_bad_params() {
        let server = RpcServer::new(RpcConfig::new("127.0.0.1:0"));
        server
            .register_typed("double", |n: u64| async move { Ok(n * 2) })
            .await;

        let resp = roundtrip(&server, RpcRequest::new(1, "double".into(), vec![1])).await;
        assert!(resp.error().unwrap().starts_with("Serialization error"));

        let params = bincode::serialize(&21u64).unwrap();
        let resp = roundtrip(&server, RpcRequest::new(2, "double".into(), params)).await;
        let value: u64 = bincode::deserialize(resp.result().unwrap()).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn each_connection_gets_its_own_session() {
        let server = RpcServer::new(RpcConfig::new("127.0.0.1:0"));
        server
            .register_typed_with_session("whoami", |session, _: ()| async move {
                Ok(session.raw())
            })
            .await;

        let request = RpcRequest::new(1, "whoami".into(), bincode::serialize(&()).unwrap());
        let first = roundtrip(&server, request.clone()).await;
        let second = roundtrip(&server, request).await;
        let first: u64 = bincode::deserialize(first.result().unwrap()).unwrap();
        let second: u64 = bincode::deserialize(second.result().unwrap()).unwrap();
        assert_ne!(first, second);
        assert_ne!(first, SessionId::LOCAL.raw());
    }

    #[tokio::test]
    async fn disconnect_hook_sees_the_closed_session() {
        let server = RpcServer::new(RpcConfig::new("127.0.0.1:0"));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        server
            .register_typed_with_session("whoami", |session, _: ()| async move {
                Ok(session.raw())
            })
            .await;
        server
            .on_disconnect(move |session| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(session);
                }
            })
            .await;

        let request = RpcRequest::new(1, "whoami".into(), bincode::serialize(&()).unwrap());
        let resp = roundtrip(&server, request).await;
        let served: u64 = bincode::deserialize(resp.result().unwrap()).unwrap();

        let closed = rx.recv().await.unwrap();
        assert_eq!(closed, SessionId::new(served));
    }
}
