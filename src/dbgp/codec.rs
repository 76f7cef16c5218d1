//! DBGP wire codec
//!
//! Engine → IDE messages carry a decimal length prefix and are NUL-delimited:
//! ```text
//! <decimal-length>\0<payload>\0
//! ```
//! IDE → engine commands are plain text terminated by a single NUL.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};

/// Declaration prepended to every outbound XML document
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Default upper bound for a single framed message
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

const NUL: u8 = 0;

/// Write one length-prefixed message and flush
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let header = payload.len().to_string();

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&[NUL]).await?;
    writer.write_all(payload).await?;
    writer.write_all(&[NUL]).await?;
    writer.flush().await?;

    Ok(())
}

/// Write an XML document, prefixed with the XML declaration
///
/// The length prefix covers the declaration as well as the document.
pub async fn write_xml<W: AsyncWrite + Unpin>(writer: &mut W, document: &str) -> Result<()> {
    let mut payload = String::with_capacity(XML_DECLARATION.len() + document.len());
    payload.push_str(XML_DECLARATION);
    payload.push_str(document);
    tracing::trace!("DBGP <<< {}", document);
    write_message(writer, payload.as_bytes()).await
}

/// Longest accepted decimal length prefix
const MAX_HEADER_DIGITS: usize = 20;

/// Read one length-prefixed message
///
/// Returns `Ok(None)` when the stream ends cleanly before a new message starts.
pub async fn read_message<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<Vec<u8>>> {
    let header = match read_until_nul(reader, MAX_HEADER_DIGITS).await? {
        Delimited::Eof => return Ok(None),
        Delimited::Complete(header) => header,
        Delimited::Truncated => {
            return Err(Error::Framing("stream ended inside length prefix".to_string()))
        }
        Delimited::TooLong(_) => {
            return Err(Error::Framing("length prefix is too long".to_string()))
        }
    };

    let header = std::str::from_utf8(&header)
        .map_err(|_| Error::Framing("length prefix is not ASCII".to_string()))?;
    let len: usize = header
        .parse()
        .map_err(|_| Error::Framing(format!("invalid length prefix: {:?}", header)))?;
    if len > max_len {
        return Err(Error::MessageTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Framing(format!("stream ended inside a {} byte payload", len))
        } else {
            Error::Io(e)
        }
    })?;

    let mut terminator = [0u8; 1];
    reader.read_exact(&mut terminator).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Framing("missing NUL terminator".to_string())
        } else {
            Error::Io(e)
        }
    })?;
    if terminator[0] != NUL {
        return Err(Error::Framing(format!(
            "expected NUL terminator, found byte {:#04x}",
            terminator[0]
        )));
    }

    Ok(Some(payload))
}

/// Read one NUL-terminated command
///
/// Returns the raw command bytes, or `Ok(None)` when the peer closes the
/// stream cleanly. At most `max_len + 1` bytes are buffered.
pub async fn read_command<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<Vec<u8>>> {
    match read_until_nul(reader, max_len).await? {
        Delimited::Eof => Ok(None),
        Delimited::Complete(raw) => {
            tracing::trace!("DBGP >>> {}", String::from_utf8_lossy(&raw));
            Ok(Some(raw))
        }
        Delimited::Truncated => Err(Error::Framing("stream ended inside a command".to_string())),
        Delimited::TooLong(len) => Err(Error::MessageTooLarge(len)),
    }
}

enum Delimited {
    Eof,
    Complete(Vec<u8>),
    /// The stream ended before a NUL
    Truncated,
    /// No NUL within the limit; carries the number of bytes read
    TooLong(usize),
}

/// Read up to a NUL, buffering no more than `max_len` bytes plus the terminator
async fn read_until_nul<R: AsyncBufRead + Unpin>(reader: &mut R, max_len: usize) -> Result<Delimited> {
    let mut raw = Vec::new();
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let n = (&mut *reader).take(limit).read_until(NUL, &mut raw).await?;

    if n == 0 {
        return Ok(Delimited::Eof);
    }
    if raw.last() == Some(&NUL) {
        raw.pop();
        return Ok(Delimited::Complete(raw));
    }
    if raw.len() > max_len {
        return Ok(Delimited::TooLong(raw.len()));
    }
    Ok(Delimited::Truncated)
}
