//! # rfnet
//!
//! Remote file access over a small request/reply RPC protocol.
//!
//! A [`FileService`] exposes four procedures (open, read, write, close)
//! against files local to the server, tracked in a bounded handle table. The
//! [`transfer`] loops on the caller side copy whole files across in
//! [`CHUNK_SIZE`](protocol::CHUNK_SIZE) pieces.
//!
//! ```rust,ignore
//! use rfnet::{FileClient, RpcConfig, transfer::{get_file, NeverRetry}};
//!
//! let client = FileClient::connect(addr, RpcConfig::new("0.0.0.0:0")).await?;
//! let report = get_file(&client, "remote.txt", "local.txt".as_ref(), &mut NeverRetry).await?;
//! println!("copied {} bytes", report.bytes);
//! ```

use std::time::Duration;

pub mod chunk;
pub mod client;
pub mod config;
pub mod connection;
pub mod console;
pub mod errors;
pub mod handles;
pub mod logging;
pub mod protocol;
pub mod request;
pub mod response;
pub mod server;
pub mod service;
pub mod transfer;

pub use client::RpcClient;
pub use config::{RpcConfig, ServiceConfig};
pub use errors::RpcError;
pub use protocol::{FileHandle, OpenMode, Status, CHUNK_SIZE};
pub use request::RpcRequest;
pub use response::RpcResponse;
pub use server::{RpcServer, SessionId};
pub use service::{FileClient, FileServer, FileService, RemoteFiles};
pub use transfer::{get_file, send_file, NeverRetry, RetryPolicy, TransferError, TransferReport};

/// Per-call timeout applied by [`RpcClient`] unless configured otherwise.
#[cfg(not(test))]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

#[cfg(test)]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
