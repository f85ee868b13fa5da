//! Readable handles over an entry's stored bytes.
//!
//! `open` exposes the compressed representation exactly as stored; picking a
//! codec for it (based on [`EntryHeader::method`]) is the caller's job.
//!
//! Headers yielded by random-access scans keep a weak reference to their
//! source, so any number of entries can be opened concurrently, before or
//! after the scan finishes, without a shared cursor. Headers from stream
//! scans have no such backing; use the scan's own `read_entry` /
//! `write_entry_to`, which exist only when the stream can seek.

use std::sync::{Arc, Weak};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::error::ScanError;
use super::structures::{EntryHeader, LFH_SIGNATURE, LFH_SIZE};
use crate::io::ReadAt;

/// Copy chunk for [`RawEntry::write_to`].
const COPY_CHUNK: usize = 64 * 1024;

impl EntryHeader {
    /// Open the entry's stored (still-compressed) bytes.
    ///
    /// Reads the local file header at [`local_header_offset`] first: its
    /// name/extra lengths are authoritative for where the payload starts and
    /// may legitimately differ from the central directory copy.
    ///
    /// Fails with [`ScanError::Unsupported`] when the header came from a
    /// stream scan or the backing source has been dropped.
    ///
    /// [`local_header_offset`]: EntryHeader::local_header_offset
    pub async fn open(&self) -> Result<RawEntry, ScanError> {
        let source = self
            .source
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                ScanError::Unsupported(
                    "entry is not backed by a live random-access source".to_string(),
                )
            })?;

        let offset = payload_offset(&*source, self.local_header_offset).await?;
        Ok(RawEntry {
            source,
            offset,
            remaining: self.compressed_size as u64,
        })
    }

    /// Copy the entry's stored bytes into `sink`, returning the byte count
    /// (always the entry's `compressed_size` on success).
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, sink: &mut W) -> Result<u64, ScanError> {
        let mut entry = self.open().await?;
        entry.write_to(sink).await
    }
}

/// Locate the payload behind a local file header with one independent read.
async fn payload_offset(source: &dyn ReadAt, lfh_offset: u64) -> Result<u64, ScanError> {
    let mut lfh = [0u8; LFH_SIZE];
    source
        .read_exact_at(lfh_offset, &mut lfh)
        .await
        .map_err(|e| ScanError::io(lfh_offset, LFH_SIZE, e))?;

    if &lfh[..4] != LFH_SIGNATURE {
        return Err(ScanError::malformed(lfh_offset, "invalid local file header"));
    }

    let name_len = u16::from_le_bytes([lfh[26], lfh[27]]) as u64;
    let extra_len = u16::from_le_bytes([lfh[28], lfh[29]]) as u64;
    Ok(lfh_offset + LFH_SIZE as u64 + name_len + extra_len)
}

/// Readable handle over one entry's stored bytes.
///
/// Self-contained: it holds its own offset and an owning reference to the
/// source, so handles for different entries can be driven concurrently.
pub struct RawEntry {
    source: Arc<dyn ReadAt>,
    offset: u64,
    remaining: u64,
}

impl RawEntry {
    /// Stored bytes not yet read from this handle.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read up to `buf.len()` stored bytes, returning 0 at the end.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ScanError> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.remaining) as usize;
        let n = self
            .source
            .read_at(self.offset, &mut buf[..want])
            .await
            .map_err(|e| ScanError::io(self.offset, want, e))?;
        if n == 0 {
            return Err(ScanError::malformed(
                self.offset,
                "stored data ends before its declared compressed size",
            ));
        }
        self.offset += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }

    /// Drain the handle into `sink`, returning the bytes written.
    pub async fn write_to<W: AsyncWrite + Unpin>(&mut self, sink: &mut W) -> Result<u64, ScanError> {
        let mut chunk = vec![0u8; COPY_CHUNK.min(self.remaining.max(1) as usize)];
        let mut written = 0u64;
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(written);
            }
            sink.write_all(&chunk[..n])
                .await
                .map_err(|e| ScanError::io(self.offset, n, e))?;
            written += n as u64;
        }
    }
}
