//! Framed messages between the orchestrator and a runner process
//!
//! Every frame is a 4-byte sync marker, a 4-byte big-endian length and a
//! JSON payload. The marker starts with `0xFF`, which never occurs in UTF-8
//! text, so a reader can skip stray output (library banners, a forgotten
//! `println!`) that lands on the same pipe and pick up the next frame.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use thiserror::Error;
use tracing::debug;

use super::row::ResultRow;

/// Marker written in front of every frame
pub const FRAME_MAGIC: [u8; 4] = *b"\xffOCR";

/// Largest payload accepted on the channel
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Messages sent from a runner process to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerMessage {
    /// Informational progress line for the operator
    Progress(String),
    /// The engine finished loading
    Loaded(String),
    /// The engine could not be initialized; no rows will follow
    InitFailed(String),
    /// The complete result collection for this engine
    Results(Vec<ResultRow>),
}

/// Errors on the framed channel
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error on runner channel: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("malformed frame payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("channel closed in the middle of a frame")]
    Truncated,
}

/// Serialize a value and write it as one frame
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec(value)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    writer.write_all(&FRAME_MAGIC)?;
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame, skipping any bytes before the next frame marker.
///
/// Returns `Ok(None)` when the stream ends outside a frame.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, ProtocolError> {
    if !seek_marker(reader)? {
        return Ok(None);
    }

    let mut header = [0u8; 4];
    read_exact_or_truncated(reader, &mut header)?;

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    read_exact_or_truncated(reader, &mut payload)?;

    Ok(Some(serde_json::from_slice(&payload)?))
}

/// Consume bytes up to and including the next frame marker
fn seek_marker<R: Read>(reader: &mut R) -> Result<bool, ProtocolError> {
    let mut byte = [0u8; 1];
    let mut matched = 0;
    let mut skipped = 0usize;

    while matched < FRAME_MAGIC.len() {
        match reader.read(&mut byte) {
            Ok(0) if matched == 0 => {
                if skipped > 0 {
                    debug!("Skipped {} bytes of trailing non-frame output", skipped);
                }
                return Ok(false);
            }
            Ok(0) => return Err(ProtocolError::Truncated),
            Ok(_) => {
                if byte[0] == FRAME_MAGIC[matched] {
                    matched += 1;
                } else {
                    skipped += matched + 1;
                    // The first marker byte appears nowhere else in the marker
                    matched = usize::from(byte[0] == FRAME_MAGIC[0]);
                    skipped -= matched;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if skipped > 0 {
        debug!("Skipped {} bytes of non-frame output", skipped);
    }
    Ok(true)
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            ProtocolError::Truncated
        } else {
            ProtocolError::Io(e)
        }
    })
}

impl ProtocolError {
    /// Whether the stream can still yield later frames after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::FrameTooLarge(_) | ProtocolError::Payload(_))
    }
}
