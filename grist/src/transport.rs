//! Framed byte-stream transport.
//!
//! The engine assumes a message-framed duplex channel: each send delivers
//! one opaque frame and each receive yields exactly one previously-sent
//! frame, in order. Over a raw byte stream that property is established
//! with a 4-byte big-endian length prefix per frame. The prefix belongs to
//! this layer alone — codec bytes never contain it, so the protocol frames
//! on the wire stay byte-identical to their encoded form.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Maximum allowed frame payload (16 MiB).
const MAX_FRAME: u32 = 16 * 1024 * 1024;

/// Connects to the server endpoint.
pub(crate) async fn connect(addr: &str) -> Result<TcpStream> {
    TcpStream::connect(addr).await.map_err(|source| Error::Connect {
        addr: addr.to_owned(),
        source,
    })
}

/// Writes one frame — length prefix, bytes, flush — as a single unit.
pub(crate) async fn send_frame<W>(w: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(frame.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame exceeds u32::MAX"))?;
    w.write_all(&len.to_be_bytes()).await.map_err(map_closed)?;
    w.write_all(frame).await.map_err(map_closed)?;
    w.flush().await.map_err(map_closed)
}

/// Reads one length-prefixed frame, blocking until it arrives in full.
pub(crate) async fn recv_frame<R>(r: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.map_err(map_closed)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds 16 MiB limit",
        )));
    }
    let mut frame = vec![0u8; len as usize];
    r.read_exact(&mut frame).await.map_err(map_closed)?;
    Ok(frame)
}

/// Maps end-of-stream conditions onto [`Error::Closed`].
fn map_closed(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Error::Closed,
        _ => Error::Io(e),
    }
}
