//! Wire types for the remote file procedures.
//!
//! Every reply carries a two-valued [`Status`]. The optional `detail` string
//! is a human-readable diagnostic and never changes what the status means.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bytes moved per Read or Write call by the transfer loops.
pub const CHUNK_SIZE: usize = 64;

pub const OPEN_METHOD: &str = "RemoteFile.open";
pub const READ_METHOD: &str = "RemoteFile.read";
pub const WRITE_METHOD: &str = "RemoteFile.write";
pub const CLOSE_METHOD: &str = "RemoteFile.close";

/// Outcome of a remote procedure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Failed => write!(f, "FAILED"),
        }
    }
}

/// Identifies a file held open by the service.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(u32);

impl FileHandle {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl OpenMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
        }
    }
}

impl FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            other => Err(format!("invalid open mode {other:?}")),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub path: String,
    pub mode: OpenMode,
}

/// `handle` is only present when `status` is [`Status::Ok`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenReply {
    pub status: Status,
    pub handle: Option<FileHandle>,
    pub detail: Option<String>,
}

impl OpenReply {
    pub fn opened(handle: FileHandle) -> Self {
        Self {
            status: Status::Ok,
            handle: Some(handle),
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            handle: None,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub handle: FileHandle,
    pub max_bytes: u32,
}

/// A successful reply with `bytes_read == 0` marks end-of-stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReadReply {
    pub status: Status,
    pub data: Vec<u8>,
    pub bytes_read: u32,
    pub detail: Option<String>,
}

impl ReadReply {
    pub fn ok(data: Vec<u8>) -> Self {
        Self {
            status: Status::Ok,
            bytes_read: data.len() as u32,
            data,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            data: Vec::new(),
            bytes_read: 0,
            detail: Some(detail.into()),
        }
    }

    pub fn is_eof(&self) -> bool {
        self.status.is_ok() && self.bytes_read == 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub handle: FileHandle,
    pub data: Vec<u8>,
    pub byte_count: u32,
}

impl WriteRequest {
    pub fn new(handle: FileHandle, data: Vec<u8>) -> Self {
        Self {
            handle,
            byte_count: data.len() as u32,
            data,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WriteReply {
    pub status: Status,
    pub bytes_written: u32,
    pub detail: Option<String>,
}

impl WriteReply {
    pub fn ok(bytes_written: u32) -> Self {
        Self {
            status: Status::Ok,
            bytes_written,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            bytes_written: 0,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub handle: FileHandle,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CloseReply {
    pub status: Status,
    pub detail: Option<String>,
}

impl CloseReply {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            detail: Some(detail.into()),
        }
    }
}
