//! The `Message` value type and its length-prefixed wire framing.
//!
//! Every frame on the wire is one `Message`: a 4-byte big-endian length
//! prefix followed by that many bytes of JSON. The three fields cross the
//! network exactly as constructed; neither peer mutates a message.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for one encoded frame. A length prefix beyond this is not a
/// plausible chat message and is rejected before any allocation.
const MAX_FRAME_BYTES: u32 = 64 * 1024;

/// What a message does: log a user in, carry text, or log a user out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Join,
    Send,
    Leave,
}

/// One chat protocol message. Immutable after construction.
///
/// `user` is the display name the client announced; `content` is free text
/// and empty for JOIN/LEAVE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub action: Action,
    pub user: String,
    pub content: String,
}

impl Message {
    pub fn join(user: impl Into<String>) -> Self {
        Self {
            action: Action::Join,
            user: user.into(),
            content: String::new(),
        }
    }

    pub fn send(user: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            action: Action::Send,
            user: user.into(),
            content: content.into(),
        }
    }

    pub fn leave(user: impl Into<String>) -> Self {
        Self {
            action: Action::Leave,
            user: user.into(),
            content: String::new(),
        }
    }
}

/// Read one framed message.
///
/// Returns `Ok(None)` when the stream ends at a frame boundary. A declared
/// length above [`MAX_FRAME_BYTES`] or a payload that does not decode as a
/// `Message` (including an unknown `action`) is an `InvalidData` error.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds limit of {MAX_FRAME_BYTES} bytes"),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    let message = serde_json::from_slice(&payload).map_err(to_io_error)?;
    Ok(Some(message))
}

/// Write one framed message and flush so the peer sees it promptly.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message).map_err(to_io_error)?;
    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
