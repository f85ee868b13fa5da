//! Chunked source adapter.
//!
//! The decoders above this module only ever ask for "N more bytes" or "this
//! window of bytes"; the two cursor flavours here hide whether those bytes
//! come from positioned reads against a shared [`ReadAt`] source or from a
//! single sequential stream. The choice of flavour is made once, when a scan
//! is constructed, not per call.

use async_trait::async_trait;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use super::error::ScanError;
use crate::io::ReadAt;

/// Scratch size used when a sequential stream has to discard bytes.
const DISCARD_CHUNK: usize = 8 * 1024;

/// Forward cursor over a byte source.
///
/// `pull` appends exactly `n` bytes to the caller's accumulation buffer;
/// anything short of that is an error, never a silent partial read.
#[async_trait]
pub(crate) trait Fetch: Send {
    /// Absolute offset of the next byte `pull` would return.
    fn position(&self) -> u64;

    /// Append exactly `n` more bytes to `buf`.
    async fn pull(&mut self, buf: &mut Vec<u8>, n: usize) -> Result<(), ScanError>;

    /// Advance the cursor by `n` bytes without retaining them.
    async fn skip(&mut self, n: u64) -> Result<(), ScanError>;
}

/// Cursor over a shared random-access source. Skipping is free; the source
/// itself is never mutated, so any number of cursors may coexist.
pub(crate) struct RangeCursor<R: ReadAt> {
    source: Arc<R>,
    size: u64,
    pos: u64,
}

impl<R: ReadAt> RangeCursor<R> {
    pub(crate) fn new(source: Arc<R>, pos: u64) -> Self {
        let size = source.size();
        Self { source, size, pos }
    }

    pub(crate) fn source(&self) -> &Arc<R> {
        &self.source
    }

    pub(crate) fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }
}

#[async_trait]
impl<R: ReadAt + 'static> Fetch for RangeCursor<R> {
    fn position(&self) -> u64 {
        self.pos
    }

    async fn pull(&mut self, buf: &mut Vec<u8>, n: usize) -> Result<(), ScanError> {
        if self.pos + n as u64 > self.size {
            return Err(ScanError::malformed(
                self.pos,
                format!("record needs {n} bytes but the archive ends first"),
            ));
        }

        let start = buf.len();
        buf.resize(start + n, 0);
        self.source
            .read_exact_at(self.pos, &mut buf[start..])
            .await
            .map_err(|e| ScanError::io(self.pos, n, e))?;
        self.pos += n as u64;
        Ok(())
    }

    async fn skip(&mut self, n: u64) -> Result<(), ScanError> {
        if self.pos + n > self.size {
            return Err(ScanError::malformed(
                self.pos,
                format!("payload of {n} bytes extends past end of archive"),
            ));
        }
        self.pos += n;
        Ok(())
    }
}

/// Cursor over an exclusively owned sequential stream.
pub(crate) struct StreamCursor<S> {
    stream: S,
    pos: u64,
}

impl<S> StreamCursor<S> {
    pub(crate) fn new(stream: S, pos: u64) -> Self {
        Self { stream, pos }
    }

    pub(crate) fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Reset the tracked absolute position after an external seek.
    pub(crate) fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }
}

#[async_trait]
impl<S: AsyncRead + Unpin + Send> Fetch for StreamCursor<S> {
    fn position(&self) -> u64 {
        self.pos
    }

    async fn pull(&mut self, buf: &mut Vec<u8>, n: usize) -> Result<(), ScanError> {
        let start = buf.len();
        buf.resize(start + n, 0);
        match self.stream.read_exact(&mut buf[start..]).await {
            Ok(_) => {
                self.pos += n as u64;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ScanError::malformed(
                self.pos,
                format!("record needs {n} bytes but the stream ended first"),
            )),
            Err(e) => Err(ScanError::io(self.pos, n, e)),
        }
    }

    async fn skip(&mut self, n: u64) -> Result<(), ScanError> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        let mut remaining = n;
        while remaining > 0 {
            let want = remaining.min(DISCARD_CHUNK as u64) as usize;
            match self.stream.read_exact(&mut scratch[..want]).await {
                Ok(_) => {
                    self.pos += want as u64;
                    remaining -= want as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(ScanError::malformed(
                        self.pos,
                        format!("payload of {n} bytes extends past end of stream"),
                    ));
                }
                Err(e) => return Err(ScanError::io(self.pos, want, e)),
            }
        }
        Ok(())
    }
}

/// Positioned window reads, the only capability the EOCD locator needs.
#[async_trait]
pub(crate) trait WindowRead: Send {
    /// Total length of the underlying source.
    async fn len(&mut self) -> Result<u64, ScanError>;

    /// Fill `buf` with the bytes at `offset`.
    async fn read_window(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), ScanError>;
}

/// Window reads over a random-access source.
pub(crate) struct RangeWindow<'a, R: ReadAt>(pub(crate) &'a R);

#[async_trait]
impl<R: ReadAt> WindowRead for RangeWindow<'_, R> {
    async fn len(&mut self) -> Result<u64, ScanError> {
        Ok(self.0.size())
    }

    async fn read_window(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), ScanError> {
        self.0
            .read_exact_at(offset, buf)
            .await
            .map_err(|e| ScanError::io(offset, buf.len(), e))
    }
}

/// Window reads over a seekable stream. The stream position after a call is
/// unspecified; callers re-seek before resuming forward reads.
pub(crate) struct SeekWindow<'a, S>(pub(crate) &'a mut S);

#[async_trait]
impl<S: AsyncRead + AsyncSeek + Unpin + Send> WindowRead for SeekWindow<'_, S> {
    async fn len(&mut self) -> Result<u64, ScanError> {
        self.0
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| ScanError::io(0, 0, e))
    }

    async fn read_window(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), ScanError> {
        self.0
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| ScanError::io(offset, buf.len(), e))?;
        match self.0.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ScanError::malformed(
                offset,
                format!("window of {} bytes extends past end of stream", buf.len()),
            )),
            Err(e) => Err(ScanError::io(offset, buf.len(), e)),
        }
    }
}
