//! Length-prefixed message framing for JSON-RPC over local sockets.
//!
//! Avogadro2 reads its RPC socket through a Qt `QDataStream`, which encodes a
//! byte array as a 32-bit big-endian length followed by the raw bytes. This
//! module produces and consumes that layout.
//!
//! # Wire Format
//!
//! ```text
//! +----------------+---------------------------+
//! | u32 length, BE | <length> bytes of JSON    |
//! +----------------+---------------------------+
//! ```
//!
//! A length of `0xFFFFFFFF` is how `QDataStream` writes a null byte array; it
//! decodes as an empty payload.

use anyhow::{anyhow, Context, Result};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Maximum payload size (100MB) to prevent OOM from malicious/buggy peers.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Length value `QDataStream` uses for a null `QByteArray`.
const NULL_BYTE_ARRAY: u32 = u32::MAX;

/// Framing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Declared or actual payload length is above [`MAX_FRAME_SIZE`].
    #[error("Frame size {size} exceeds maximum {max} bytes")]
    TooLarge { size: usize, max: usize },
}

/// Encode `payload` as one contiguous frame (header followed by payload).
///
/// Returning a single buffer lets the caller hand the whole frame to one
/// write call, so the peer never observes the header without its payload.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    // MAX_FRAME_SIZE < u32::MAX, so the cast cannot truncate
    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Write a framed message to the stream with a single write.
///
/// For code playing the Avogadro2 side of the socket (tools, tests). The
/// client path writes through [`ConnectionManager::write_frame`] instead.
///
/// [`ConnectionManager::write_frame`]: crate::ipc::ConnectionManager::write_frame
///
/// # Errors
///
/// Returns an error if the payload is too large, or the write or flush fails.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;

    writer
        .write_all(&frame)
        .await
        .context("Failed to write frame")?;

    writer.flush().await.context("Failed to flush frame")?;

    Ok(())
}

/// Read exactly one framed message from the stream.
///
/// Whole-message counterpart of [`FrameDecoder`] for the server side of the
/// socket. The client never reads this way; its reader task hands raw chunks
/// to a decoder.
///
/// # Errors
///
/// Returns an error if:
/// - The stream is closed (EOF) before a header arrives
/// - The declared length exceeds [`MAX_FRAME_SIZE`]
/// - The payload cannot be read completely
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(anyhow!("Connection closed by peer"));
        }
        Err(e) => return Err(e).context("Failed to read frame header"),
    }

    let declared = u32::from_be_bytes(header);
    if declared == NULL_BYTE_ARRAY {
        return Ok(Vec::new());
    }

    let size = declared as usize;
    if size > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size,
            max: MAX_FRAME_SIZE,
        }
        .into());
    }

    let mut payload = vec![0u8; size];
    reader
        .read_exact(&mut payload)
        .await
        .context("Failed to read frame payload")?;

    Ok(payload)
}

/// Incremental decoder for frames arriving in arbitrary chunks.
///
/// Bytes are appended as the transport reports them; complete frames are
/// split off the front and an incomplete tail stays buffered until more data
/// arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes waiting to be decoded.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard everything buffered, resynchronizing on the next byte received.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Split the next complete frame off the buffer.
    ///
    /// Returns `Ok(None)` when no complete frame is buffered yet.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&self.buffer[..HEADER_SIZE]);
        let declared = u32::from_be_bytes(header);

        if declared == NULL_BYTE_ARRAY {
            self.buffer.drain(..HEADER_SIZE);
            return Ok(Some(Vec::new()));
        }

        let size = declared as usize;
        if size > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        if self.buffer.len() - HEADER_SIZE < size {
            return Ok(None);
        }

        self.buffer.drain(..HEADER_SIZE);
        Ok(Some(self.buffer.drain(..size).collect()))
    }

    /// Drain every complete frame and return only the last one.
    ///
    /// Earlier frames of the same batch are dropped. Callers that need every
    /// message must use [`FrameDecoder::next_frame`] instead.
    ///
    /// A bad header behind a completed frame does not cost that frame: the
    /// frame is returned and the bad header stays buffered, so the next call
    /// reports it.
    pub fn take_last_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut last = None;
        loop {
            match self.next_frame() {
                Ok(Some(frame)) => last = Some(frame),
                Ok(None) => return Ok(last),
                Err(e) => return last.map_or(Err(e), |frame| Ok(Some(frame))),
            }
        }
    }
}
