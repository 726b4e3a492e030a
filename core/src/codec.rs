use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::Envelope;

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Longest envelope line accepted by [`read_envelope`], newline excluded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Raised as the inner error of an `InvalidData` io error when a line
/// exceeds the length cap.
#[derive(Debug, thiserror::Error)]
#[error("line exceeds {0} bytes")]
pub struct LineTooLong(pub usize);

pub fn is_line_too_long(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<LineTooLong>())
}

/// Reads the next envelope, skipping blank lines. `Ok(None)` means EOF.
pub async fn read_envelope<R>(reader: &mut R) -> io::Result<Option<Envelope>>
where
    R: AsyncBufRead + Unpin,
{
    read_envelope_limited(reader, MAX_LINE_BYTES).await
}

/// [`read_envelope`] with an explicit cap. Never buffers more than
/// `max_line_bytes + 1` bytes of one line; a longer line fails with
/// [`LineTooLong`] and its remainder is left unread.
pub async fn read_envelope_limited<R>(
    reader: &mut R,
    max_line_bytes: usize,
) -> io::Result<Option<Envelope>>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max_line_bytes as u64 + 1;
    let mut line = String::new();
    loop {
        line.clear();
        let read = (&mut *reader).take(limit).read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        if read > max_line_bytes && !line.ends_with('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                LineTooLong(max_line_bytes),
            ));
        }

        if let Some(envelope) = decode_line(&line)? {
            return Ok(Some(envelope));
        }
    }
}

/// Parses one line; `Ok(None)` for a blank line.
pub fn decode_line(line: &str) -> io::Result<Option<Envelope>> {
    let trimmed = line.trim_end_matches(LINE_ENDINGS);
    if trimmed.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some).map_err(to_io_error)
}

/// Writes one envelope as a JSON line and flushes.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = serde_json::to_vec(envelope).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
