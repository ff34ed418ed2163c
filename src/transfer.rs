//! Caller-side transfer loops.
//!
//! [`get_file`] copies a remote file to a local path and [`send_file`] copies
//! a local file to a remote path, [`CHUNK_SIZE`] bytes per call. Each remote
//! call is awaited before the next is issued.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::chunk::read_chunk;
use crate::errors::RpcError;
use crate::protocol::{
    CloseRequest, FileHandle, OpenMode, OpenReply, OpenRequest, ReadRequest, Status,
    WriteRequest, CHUNK_SIZE,
};
use crate::service::RemoteFiles;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot create local file {}: {source}", .path.display())]
    LocalDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot open local file {}: {source}", .path.display())]
    LocalSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("remote file {path:?} could not be opened: {}", .detail.as_deref().unwrap_or("no detail"))]
    RemoteOpen {
        path: String,
        detail: Option<String>,
    },

    #[error("no reply to remote {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: RpcError,
    },

    #[error("remote read failed: {}", .detail.as_deref().unwrap_or("no detail"))]
    RemoteRead { detail: Option<String> },

    #[error("remote write failed: {}", .detail.as_deref().unwrap_or("no detail"))]
    RemoteWrite { detail: Option<String> },

    #[error("local I/O error: {0}")]
    LocalIo(#[from] io::Error),
}

impl TransferError {
    /// Whether the error should end the whole session rather than only the
    /// current transfer.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            TransferError::LocalDestination { .. } | TransferError::LocalSource { .. }
        )
    }
}

/// Decisions and notifications supplied by whoever drives a transfer.
pub trait RetryPolicy {
    /// The remote file could not be opened for reading. Returning a name
    /// retries the open with it; `None` abandons the transfer.
    fn retry_remote_open(&mut self, path: &str, error: &TransferError) -> Option<String>;

    /// The local source could not be opened. Returning a path retries with
    /// it; `None` gives up.
    fn retry_local_open(&mut self, path: &Path, error: &io::Error) -> Option<PathBuf>;

    /// Called with every chunk as it is moved.
    fn on_chunk(&mut self, _data: &[u8]) {}
}

/// Declines every retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn retry_remote_open(&mut self, _path: &str, _error: &TransferError) -> Option<String> {
        None
    }

    fn retry_local_open(&mut self, _path: &Path, _error: &io::Error) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub remote_path: String,
    pub local_path: PathBuf,
    pub bytes: u64,
    pub chunks: usize,
    /// False when the remote Close failed or got no reply.
    pub remote_closed: bool,
}

/// Copies `remote_path` from the service into `local_path`.
///
/// The local file is created first. If the remote open fails, `policy` may
/// supply another remote name; otherwise the local file is removed and the
/// transfer is abandoned. Once the remote file is open it is always closed,
/// whatever happened in the read loop.
pub async fn get_file<R, P>(
    remote: &R,
    remote_path: &str,
    local_path: &Path,
    policy: &mut P,
) -> Result<TransferReport, TransferError>
where
    R: RemoteFiles + ?Sized,
    P: RetryPolicy + ?Sized,
{
    let mut local = File::create(local_path)
        .await
        .map_err(|source| TransferError::LocalDestination {
            path: local_path.to_path_buf(),
            source,
        })?;

    let mut remote_path = remote_path.to_string();
    let handle = loop {
        let failure = match open_remote(remote, &remote_path, OpenMode::Read).await {
            Ok(handle) => break handle,
            Err(failure) => failure,
        };
        warn!("{failure}");
        match policy.retry_remote_open(&remote_path, &failure) {
            Some(next) => remote_path = next,
            None => {
                drop(local);
                if let Err(e) = tokio::fs::remove_file(local_path).await {
                    warn!("could not remove {}: {e}", local_path.display());
                }
                return Err(failure);
            }
        }
    };
    info!("copying remote {remote_path:?} ({handle}) to {}", local_path.display());

    let outcome = pull_chunks(remote, handle, &mut local, policy).await;
    let flushed = local.flush().await;
    drop(local);
    let remote_closed = close_remote(remote, handle).await;

    let (bytes, chunks) = outcome?;
    flushed?;
    Ok(TransferReport {
        remote_path,
        local_path: local_path.to_path_buf(),
        bytes,
        chunks,
        remote_closed,
    })
}

/// Copies `local_path` to `remote_path` on the service.
///
/// If the local file cannot be opened, `policy` may supply another path;
/// declining is session-fatal. Any remote failure ends the transfer.
pub async fn send_file<R, P>(
    remote: &R,
    local_path: &Path,
    remote_path: &str,
    policy: &mut P,
) -> Result<TransferReport, TransferError>
where
    R: RemoteFiles + ?Sized,
    P: RetryPolicy + ?Sized,
{
    let mut local_path = local_path.to_path_buf();
    let mut local = loop {
        match File::open(&local_path).await {
            Ok(file) => break file,
            Err(source) => {
                warn!("cannot open local file {}: {source}", local_path.display());
                match policy.retry_local_open(&local_path, &source) {
                    Some(next) => local_path = next,
                    None => return Err(TransferError::LocalSource { path: local_path, source }),
                }
            }
        }
    };

    let handle = open_remote(remote, remote_path, OpenMode::Write).await?;
    info!("copying {} to remote {remote_path:?} ({handle})", local_path.display());

    let outcome = push_chunks(remote, handle, &mut local, policy).await;
    let remote_closed = close_remote(remote, handle).await;
    drop(local);

    let (bytes, chunks) = outcome?;
    Ok(TransferReport {
        remote_path: remote_path.to_string(),
        local_path,
        bytes,
        chunks,
        remote_closed,
    })
}

async fn open_remote<R>(remote: &R, path: &str, mode: OpenMode) -> Result<FileHandle, TransferError>
where
    R: RemoteFiles + ?Sized,
{
    let request = OpenRequest {
        path: path.to_string(),
        mode,
    };
    match remote.open(request).await {
        Ok(OpenReply {
            status: Status::Ok,
            handle: Some(handle),
            ..
        }) => Ok(handle),
        Ok(reply) => Err(TransferError::RemoteOpen {
            path: path.to_string(),
            detail: reply.detail,
        }),
        Err(source) => Err(TransferError::Transport {
            operation: "open",
            source,
        }),
    }
}

async fn pull_chunks<R, P>(
    remote: &R,
    handle: FileHandle,
    local: &mut File,
    policy: &mut P,
) -> Result<(u64, usize), TransferError>
where
    R: RemoteFiles + ?Sized,
    P: RetryPolicy + ?Sized,
{
    let mut bytes = 0u64;
    let mut chunks = 0usize;
    loop {
        let request = ReadRequest {
            handle,
            max_bytes: CHUNK_SIZE as u32,
        };
        let reply = remote
            .read(request)
            .await
            .map_err(|source| TransferError::Transport {
                operation: "read",
                source,
            })?;

        if !reply.status.is_ok() {
            return Err(TransferError::RemoteRead {
                detail: reply.detail,
            });
        }
        if reply.bytes_read == 0 {
            debug!("end of remote stream after {chunks} chunks");
            break;
        }

        let n = reply.bytes_read as usize;
        if n > CHUNK_SIZE || n > reply.data.len() {
            return Err(TransferError::RemoteRead {
                detail: Some(format!(
                    "reply claims {n} bytes but carries {}",
                    reply.data.len()
                )),
            });
        }
        let chunk = &reply.data[..n];
        debug!("received {n} bytes: {:?}", String::from_utf8_lossy(chunk));
        policy.on_chunk(chunk);

        local.write_all(chunk).await?;
        bytes += n as u64;
        chunks += 1;
    }
    Ok((bytes, chunks))
}

async fn push_chunks<R, P>(
    remote: &R,
    handle: FileHandle,
    local: &mut File,
    policy: &mut P,
) -> Result<(u64, usize), TransferError>
where
    R: RemoteFiles + ?Sized,
    P: RetryPolicy + ?Sized,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut bytes = 0u64;
    let mut chunks = 0usize;
    loop {
        let n = read_chunk(local, &mut buf).await?;
        if n == 0 {
            debug!("local source exhausted after {chunks} chunks");
            break;
        }
        let chunk = &buf[..n];
        debug!("sending {n} bytes: {:?}", String::from_utf8_lossy(chunk));
        policy.on_chunk(chunk);

        // A short remote write resends the remainder.
        let mut offset = 0;
        while offset < n {
            let request = WriteRequest::new(handle, chunk[offset..].to_vec());
            let reply = remote
                .write(request)
                .await
                .map_err(|source| TransferError::Transport {
                    operation: "write",
                    source,
                })?;
            if !reply.status.is_ok() || reply.bytes_written == 0 {
                return Err(TransferError::RemoteWrite {
                    detail: reply.detail,
                });
            }
            offset += (reply.bytes_written as usize).min(n - offset);
        }

        bytes += n as u64;
        chunks += 1;
    }
    Ok((bytes, chunks))
}

/// Releases the remote handle. Failure is logged, never escalated.
async fn close_remote<R>(remote: &R, handle: FileHandle) -> bool
where
    R: RemoteFiles + ?Sized,
{
    match remote.close(CloseRequest { handle }).await {
        Ok(reply) if reply.status.is_ok() => {
            debug!("remote {handle} closed");
            true
        }
        Ok(reply) => {
            warn!(
                "remote close of {handle} failed: {}",
                reply.detail.as_deref().unwrap_or("no detail")
            );
            false
        }
        Err(e) => {
            warn!("no reply to remote close of {handle}: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_local_open_failures_end_the_session() {
        let io_err = || io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(TransferError::LocalDestination {
            path: "a".into(),
            source: io_err()
        }
        .is_session_fatal());
        assert!(TransferError::LocalSource {
            path: "a".into(),
            source: io_err()
        }
        .is_session_fatal());
        assert!(!TransferError::RemoteRead { detail: None }.is_session_fatal());
        assert!(!TransferError::Transport {
            operation: "read",
            source: RpcError::Timeout
        }
        .is_session_fatal());
        assert!(!TransferError::LocalIo(io_err()).is_session_fatal());
    }

    #[test]
    fn remote_open_message_includes_detail() {
        let err = TransferError::RemoteOpen {
            path: "x".into(),
            detail: Some("handle table full (1 open)".into()),
        };
        assert_eq!(
            err.to_string(),
            "remote file \"x\" could not be opened: handle table full (1 open)"
        );
    }
}
