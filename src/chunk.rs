use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads until `buf` is full or the reader reaches end-of-stream, returning
/// the number of bytes read. A short count therefore always means EOF.
pub async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
