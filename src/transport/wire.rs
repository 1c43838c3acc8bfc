//! Fragment transfer wire format.
//!
//! One request/response exchange per connection:
//!
//! ```text
//! frame := len:u32 (big-endian) || CBOR body
//! client -> server: FragmentRequest
//! server -> client: FragmentResponse
//! ```

use crate::codec::{self, CodecError};
use crate::fragment::ContentHash;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol identifier (for logs and version negotiation).
pub const PROTOCOL_ID: &str = "/fragment/1.0.0";

/// Largest accepted frame body (64 MiB).
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Ask a peer for a fragment's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRequest {
    pub content_hash: ContentHash,
}

/// A peer's answer; `data` is present iff `found`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentResponse {
    pub content_hash: ContentHash,
    pub found: bool,
    #[serde(default, with = "serde_bytes")]
    pub data: Option<Vec<u8>>,
}

/// Framing errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}

/// Write one length-prefixed CBOR frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = codec::encode(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(body.len()));
    }

    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed CBOR frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, WireError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(codec::decode(&body)?)
}
