//! Length-prefixed framing for stream traffic.
//!
//! Format: [4 bytes little-endian length][payload]. Datagrams carry a single
//! unframed message and are only size-checked.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::game::constants::net::{MAX_DATAGRAM_SIZE, MAX_MESSAGE_SIZE};

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn eof_as_closed(e: io::Error) -> FramingError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FramingError::ConnectionClosed
    } else {
        FramingError::Io(e)
    }
}

/// Reads frames from one stream, reusing a single buffer
pub struct FrameReader<R> {
    stream: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            buffer: vec![0u8; 4096],
        }
    }

    /// Next frame payload; valid until the following call
    pub async fn next_frame(&mut self) -> Result<&[u8], FramingError> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).await.map_err(eof_as_closed)?;

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
        }
        if len > self.buffer.len() {
            self.buffer.resize(len, 0);
        }

        self.stream
            .read_exact(&mut self.buffer[..len])
            .await
            .map_err(eof_as_closed)?;
        Ok(&self.buffer[..len])
    }
}

/// Write one frame and flush it
pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, data: &[u8]) -> Result<(), FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }
    stream.write_all(&(data.len() as u32).to_le_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

/// Drain a connection's outbound queue into its stream until either side closes.
///
/// Returns the number of frames written.
pub async fn pump_outbound<W: AsyncWrite + Unpin>(
    mut stream: W,
    mut outbound: mpsc::Receiver<Arc<[u8]>>,
) -> Result<u64, FramingError> {
    let mut written = 0;
    while let Some(frame) = outbound.recv().await {
        write_frame(&mut stream, &frame).await?;
        written += 1;
    }
    Ok(written)
}

/// Validate datagram size (for unreliable messages)
pub fn validate_datagram_size(data: &[u8]) -> Result<(), FramingError> {
    if data.len() > MAX_DATAGRAM_SIZE {
        Err(FramingError::MessageTooLarge(data.len(), MAX_DATAGRAM_SIZE))
    } else {
        Ok(())
    }
}
