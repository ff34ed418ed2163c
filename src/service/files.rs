use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::RemoteFiles;
use crate::chunk::read_chunk;
use crate::config::ServiceConfig;
use crate::errors::RpcError;
use crate::handles::HandleTable;
use crate::protocol::{
    CloseReply, CloseRequest, OpenMode, OpenReply, OpenRequest, ReadReply, ReadRequest, WriteReply,
    WriteRequest,
};
use crate::server::SessionId;

/// Executes the open/read/write/close procedures against local files.
///
/// All calls go through one process-wide handle table, so concurrent sessions
/// contend for the same slots. A handle can only be used by the session that
/// opened it.
pub struct FileService {
    config: ServiceConfig,
    table: Mutex<HandleTable<File>>,
}

impl FileService {
    pub fn new(config: ServiceConfig) -> Self {
        let table = HandleTable::new(config.capacity);
        Self {
            config,
            table: Mutex::new(table),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Number of handles currently open.
    pub async fn open_count(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn open_file(&self, session: SessionId, request: OpenRequest) -> OpenReply {
        info!("{session}: open {:?} mode {}", request.path, request.mode);

        let path = match self.resolve(&request.path) {
            Ok(path) => path,
            Err(reason) => {
                warn!("open {:?} rejected: {reason}", request.path);
                return OpenReply::failed(reason);
            }
        };

        // Held across the open so a full table is detected before a
        // write-mode open can truncate anything.
        let mut table = self.table.lock().await;
        if table.len() >= table.capacity() {
            let reason = format!("handle table full ({} open)", table.capacity());
            warn!("open {:?} rejected: {reason}", request.path);
            return OpenReply::failed(reason);
        }

        let file = match open_local(&path, request.mode).await {
            Ok(file) => file,
            Err(e) => {
                warn!("open {:?} failed: {e}", request.path);
                return OpenReply::failed(e.to_string());
            }
        };

        match table.insert(session, request.path.as_str(), request.mode, file) {
            Ok(handle) => {
                info!("{session}: opened {:?} as {handle}", request.path);
                OpenReply::opened(handle)
            }
            Err(e) => OpenReply::failed(e.to_string()),
        }
    }

    pub async fn read_file(&self, session: SessionId, request: ReadRequest) -> ReadReply {
        let max = request.max_bytes as usize;
        if max == 0 || max > self.config.max_transfer {
            return ReadReply::failed(format!(
                "read size {max} outside 1..={}",
                self.config.max_transfer
            ));
        }

        let mut table = self.table.lock().await;
        let slot = match table.get_mut(session, request.handle, OpenMode::Read) {
            Ok(slot) => slot,
            Err(e) => {
                warn!("{session}: read rejected: {e}");
                return ReadReply::failed(e.to_string());
            }
        };

        match read_up_to(&mut slot.resource, max).await {
            Ok(data) => {
                debug!(
                    "read {} bytes from {:?}: {:?}",
                    data.len(),
                    slot.name,
                    String::from_utf8_lossy(&data)
                );
                ReadReply::ok(data)
            }
            Err(e) => {
                warn!("read from {:?} failed: {e}", slot.name);
                ReadReply::failed(e.to_string())
            }
        }
    }

    pub async fn write_file(&self, session: SessionId, request: WriteRequest) -> WriteReply {
        if request.byte_count as usize != request.data.len() {
            return WriteReply::failed(format!(
                "byte count {} does not match payload of {} bytes",
                request.byte_count,
                request.data.len()
            ));
        }
        if request.data.len() > self.config.max_transfer {
            return WriteReply::failed(format!(
                "payload of {} bytes exceeds limit of {}",
                request.data.len(),
                self.config.max_transfer
            ));
        }

        let mut table = self.table.lock().await;
        let slot = match table.get_mut(session, request.handle, OpenMode::Write) {
            Ok(slot) => slot,
            Err(e) => {
                warn!("{session}: write rejected: {e}");
                return WriteReply::failed(e.to_string());
            }
        };

        if request.data.is_empty() {
            return WriteReply::ok(0);
        }

        let written = write_flushed(&mut slot.resource, &request.data).await;
        match written {
            Ok(()) => {
                debug!(
                    "wrote {} bytes to {:?}: {:?}",
                    request.data.len(),
                    slot.name,
                    String::from_utf8_lossy(&request.data)
                );
                WriteReply::ok(request.byte_count)
            }
            Err(e) => {
                warn!("write to {:?} failed: {e}", slot.name);
                WriteReply::failed(e.to_string())
            }
        }
    }

    pub async fn close_file(&self, session: SessionId, request: CloseRequest) -> CloseReply {
        let slot = match self.table.lock().await.remove(session, request.handle) {
            Ok(slot) => slot,
            Err(e) => {
                warn!("{session}: close rejected: {e}");
                return CloseReply::failed(e.to_string());
            }
        };

        let mut file = slot.resource;
        match file.flush().await {
            Ok(()) => {
                info!("closed {:?} ({})", slot.name, request.handle);
                CloseReply::ok()
            }
            Err(e) => {
                warn!("close of {:?} failed: {e}", slot.name);
                CloseReply::failed(e.to_string())
            }
        }
    }

    /// Closes every file still held by `session`, returning how many there
    /// were. Called when a connection goes away.
    pub async fn release_session(&self, session: SessionId) -> usize {
        let released = self.table.lock().await.release(session);
        for (handle, slot) in &released {
            warn!("{session} ended with {:?} still open as {handle}; closing it", slot.name);
        }
        released.len()
    }

    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        if raw.is_empty() {
            return Err("empty path".into());
        }
        if raw.len() > self.config.max_path_len {
            return Err(format!(
                "path of {} bytes exceeds limit of {}",
                raw.len(),
                self.config.max_path_len
            ));
        }
        if raw.contains('\0') {
            return Err("path contains a NUL byte".into());
        }

        let path = Path::new(raw);
        match &self.config.root {
            None => Ok(path.to_path_buf()),
            Some(root) => {
                let confined = path
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
                if !confined {
                    return Err(format!("path {raw:?} escapes the served directory"));
                }
                Ok(root.join(path))
            }
        }
    }
}

async fn open_local(path: &Path, mode: OpenMode) -> io::Result<File> {
    match mode {
        OpenMode::Read => {
            let file = File::open(path).await?;
            if file.metadata().await?.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is a directory", path.display()),
                ));
            }
            Ok(file)
        }
        OpenMode::Write => {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .await
        }
    }
}

async fn write_flushed(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.write_all(data).await?;
    file.flush().await
}

/// Short only at end-of-stream, like `fread`.
async fn read_up_to(file: &mut File, max: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; max];
    let filled = read_chunk(file, &mut buf).await?;
    buf.truncate(filled);
    Ok(buf)
}

/// In-process callers all act as [`SessionId::LOCAL`].
#[async_trait]
impl RemoteFiles for FileService {
    async fn open(&self, request: OpenRequest) -> Result<OpenReply, RpcError> {
        Ok(self.open_file(SessionId::LOCAL, request).await)
    }

    async fn read(&self, request: ReadRequest) -> Result<ReadReply, RpcError> {
        Ok(self.read_file(SessionId::LOCAL, request).await)
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteReply, RpcError> {
        Ok(self.write_file(SessionId::LOCAL, request).await)
    }

    async fn close(&self, request: CloseRequest) -> Result<CloseReply, RpcError> {
        Ok(self.close_file(SessionId::LOCAL, request).await)
    }
}
