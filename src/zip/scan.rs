//! Lazy scan drivers over archive metadata.
//!
//! Four entry points share the same record walkers:
//!
//! - [`ZipScanner::scan_central`]: random-access source, EOCD-based
//! - [`ZipScanner::scan_forward`]: random-access source, from offset 0
//! - [`scan_stream_central`]: seekable stream, EOCD-based
//! - [`scan_stream`]: plain stream, forward over local headers
//!
//! Every driver is a pull-based lazy sequence: nothing is read until
//! `next_entry` is called, and each call decodes exactly one record. Records
//! are yielded in the order they appear in the scanned region (central
//! directory order or on-disk order), never path-sorted. The first error
//! fails the scan permanently; records yielded before it remain valid.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, SeekFrom};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::eocd::{DEFAULT_MAX_SEARCH, locate_eocd};
use super::error::ScanError;
use super::source::{Fetch, RangeCursor, RangeWindow, SeekWindow, StreamCursor};
use super::structures::{
    CDFH_SIGNATURE, CDFH_SIZE, CompressionMethod, EOCD_SIGNATURE, EntryHeader, EocdRecord,
    FLAG_DATA_DESCRIPTOR, LFH_SIGNATURE, LFH_SIZE,
};
use crate::io::ReadAt;

/// Caller-facing scan configuration.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// EOCD search budget in bytes; `0` (or anything at least the archive
    /// length) means unbounded.
    pub max_search: u64,
    /// Keep the archive comment bytes on the located [`EocdRecord`].
    pub keep_comment: bool,
    /// Cooperative cancellation, observed once per record boundary.
    pub cancel: Option<CancellationToken>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_search: DEFAULT_MAX_SEARCH,
            keep_comment: false,
            cancel: None,
        }
    }
}

/// Per-driver lifecycle. `Searching` only occurs on EOCD-based drivers and
/// lasts until the first pull has located the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Searching,
    AtRecord,
    Exhausted,
    Failed,
}

/// Entry point for scanning a random-access source.
///
/// The source is shared read-only state: scanners, concurrent scans and
/// [`EntryHeader::open`] calls all read through the same `Arc` without
/// coordination.
pub struct ZipScanner<R: ReadAt> {
    reader: Arc<R>,
}

impl<R: ReadAt + 'static> ZipScanner<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Locate the End of Central Directory without starting a scan.
    pub async fn locate_eocd(&self, opts: &ScanOptions) -> Result<EocdRecord, ScanError> {
        locate_eocd(&mut RangeWindow(&*self.reader), opts).await
    }

    /// Walk the central directory, locating the EOCD on the first pull.
    pub fn scan_central(&self, opts: ScanOptions) -> CentralScan<R> {
        CentralScan {
            cursor: RangeCursor::new(self.reader.clone(), 0),
            origin: downgrade(&self.reader),
            buf: Vec::new(),
            opts,
            state: State::Searching,
            eocd: None,
            yielded: 0,
        }
    }

    /// Resume a central directory walk at a known record offset, typically a
    /// [`EntryHeader::next_record_offset`] saved before an early exit.
    pub fn scan_central_at(&self, offset: u64, opts: ScanOptions) -> CentralScan<R> {
        CentralScan {
            cursor: RangeCursor::new(self.reader.clone(), offset),
            origin: downgrade(&self.reader),
            buf: Vec::new(),
            opts,
            state: State::AtRecord,
            eocd: None,
            yielded: 0,
        }
    }

    /// Walk local file headers from the start of the archive, without
    /// consulting the central directory.
    pub fn scan_forward(&self, opts: ScanOptions) -> ForwardScan<R> {
        ForwardScan {
            cursor: RangeCursor::new(self.reader.clone(), 0),
            origin: downgrade(&self.reader),
            buf: Vec::new(),
            opts,
            state: State::AtRecord,
        }
    }
}

fn downgrade<R: ReadAt + 'static>(reader: &Arc<R>) -> Weak<dyn ReadAt> {
    Arc::downgrade(&(reader.clone() as Arc<dyn ReadAt>))
}

fn check_cancel(opts: &ScanOptions) -> Result<(), ScanError> {
    match &opts.cancel {
        Some(token) if token.is_cancelled() => Err(ScanError::Cancelled),
        _ => Ok(()),
    }
}

/// EOCD-based scan over a random-access source.
pub struct CentralScan<R: ReadAt> {
    cursor: RangeCursor<R>,
    origin: Weak<dyn ReadAt>,
    buf: Vec<u8>,
    opts: ScanOptions,
    state: State,
    eocd: Option<EocdRecord>,
    yielded: u64,
}

impl<R: ReadAt + 'static> CentralScan<R> {
    /// The located EOCD record, available once the first pull has run.
    pub fn eocd(&self) -> Option<&EocdRecord> {
        self.eocd.as_ref()
    }

    /// Decode the next central directory record, or `None` once the
    /// directory is cleanly exhausted. After the first error the scan is
    /// finished and keeps returning `None`.
    pub async fn next_entry(&mut self) -> Result<Option<EntryHeader>, ScanError> {
        if matches!(self.state, State::Exhausted | State::Failed) {
            return Ok(None);
        }
        if let Err(e) = check_cancel(&self.opts) {
            self.state = State::Failed;
            return Err(e);
        }

        if self.state == State::Searching {
            let source = self.cursor.source().clone();
            let eocd = match locate_eocd(&mut RangeWindow(&*source), &self.opts).await {
                Ok(eocd) => eocd,
                Err(e) => {
                    self.state = State::Failed;
                    return Err(e);
                }
            };
            debug!(
                cd_offset = eocd.cd_offset,
                records = eocd.cd_records_total,
                "walking central directory"
            );
            self.cursor.set_position(eocd.cd_offset as u64);
            self.eocd = Some(eocd);
            self.state = State::AtRecord;
        }

        match next_central_record(&mut self.cursor, &mut self.buf, Some(&self.origin)).await {
            Ok(Some(header)) => {
                self.yielded += 1;
                Ok(Some(header))
            }
            Ok(None) => {
                self.state = State::Exhausted;
                if let Some(eocd) = &self.eocd {
                    // Tolerated: some writers get the count wrong, and the
                    // walk itself ended on a clean signature.
                    if self.yielded != eocd.cd_records_total as u64 {
                        warn!(
                            declared = eocd.cd_records_total,
                            yielded = self.yielded,
                            "central directory record count differs from EOCD"
                        );
                    }
                }
                Ok(None)
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }
}

/// Forward scan over a random-access source.
pub struct ForwardScan<R: ReadAt> {
    cursor: RangeCursor<R>,
    origin: Weak<dyn ReadAt>,
    buf: Vec<u8>,
    opts: ScanOptions,
    state: State,
}

impl<R: ReadAt + 'static> ForwardScan<R> {
    /// Decode the next local file header and skip its payload, or `None`
    /// once the central directory signature is reached.
    pub async fn next_entry(&mut self) -> Result<Option<EntryHeader>, ScanError> {
        if matches!(self.state, State::Exhausted | State::Failed) {
            return Ok(None);
        }
        if let Err(e) = check_cancel(&self.opts) {
            self.state = State::Failed;
            return Err(e);
        }

        match next_local_record(&mut self.cursor, &mut self.buf, Some(&self.origin)).await {
            Ok(Some(header)) => Ok(Some(header)),
            Ok(None) => {
                self.state = State::Exhausted;
                Ok(None)
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }
}

/// Forward scan over a sequential stream.
///
/// The stream is exclusively owned by the scan; nothing else may read it
/// while the scan is alive, which is exactly what `&mut self` enforces.
pub struct StreamScan<S> {
    cursor: StreamCursor<S>,
    buf: Vec<u8>,
    opts: ScanOptions,
    state: State,
}

/// Walk local file headers from the current position of `stream`.
pub fn scan_stream<S: AsyncRead + Unpin + Send>(stream: S, opts: ScanOptions) -> StreamScan<S> {
    StreamScan {
        cursor: StreamCursor::new(stream, 0),
        buf: Vec::new(),
        opts,
        state: State::AtRecord,
    }
}

impl<S: AsyncRead + Unpin + Send> StreamScan<S> {
    pub async fn next_entry(&mut self) -> Result<Option<EntryHeader>, ScanError> {
        if matches!(self.state, State::Exhausted | State::Failed) {
            return Ok(None);
        }
        if let Err(e) = check_cancel(&self.opts) {
            self.state = State::Failed;
            return Err(e);
        }

        match next_local_record(&mut self.cursor, &mut self.buf, None).await {
            Ok(Some(header)) => Ok(Some(header)),
            Ok(None) => {
                self.state = State::Exhausted;
                Ok(None)
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }
}

impl<S: AsyncRead + AsyncSeek + Unpin + Send> StreamScan<S> {
    /// Read the stored bytes of an already-yielded entry into memory.
    ///
    /// Only available when the stream can seek; the scan's cursor is
    /// restored afterwards, so iteration continues where it left off.
    pub async fn read_entry(&mut self, header: &EntryHeader) -> Result<Vec<u8>, ScanError> {
        read_stream_entry(&mut self.cursor, header).await
    }

    /// Copy the stored bytes of an entry into `sink`, returning the count.
    pub async fn write_entry_to<W: tokio::io::AsyncWrite + Unpin>(
        &mut self,
        header: &EntryHeader,
        sink: &mut W,
    ) -> Result<u64, ScanError> {
        write_stream_entry(&mut self.cursor, header, sink).await
    }
}

/// EOCD-based scan over a seekable sequential stream.
pub struct CentralStreamScan<S> {
    cursor: StreamCursor<S>,
    buf: Vec<u8>,
    opts: ScanOptions,
    state: State,
    eocd: Option<EocdRecord>,
    yielded: u64,
}

/// Locate the EOCD by seeking within `stream`, then walk the central
/// directory. The stream is exclusively owned by the returned scan.
pub fn scan_stream_central<S: AsyncRead + AsyncSeek + Unpin + Send>(
    stream: S,
    opts: ScanOptions,
) -> CentralStreamScan<S> {
    CentralStreamScan {
        cursor: StreamCursor::new(stream, 0),
        buf: Vec::new(),
        opts,
        state: State::Searching,
        eocd: None,
        yielded: 0,
    }
}

impl<S: AsyncRead + AsyncSeek + Unpin + Send> CentralStreamScan<S> {
    pub fn eocd(&self) -> Option<&EocdRecord> {
        self.eocd.as_ref()
    }

    pub async fn next_entry(&mut self) -> Result<Option<EntryHeader>, ScanError> {
        if matches!(self.state, State::Exhausted | State::Failed) {
            return Ok(None);
        }
        if let Err(e) = check_cancel(&self.opts) {
            self.state = State::Failed;
            return Err(e);
        }

        if self.state == State::Searching {
            match self.locate().await {
                Ok(()) => {}
                Err(e) => {
                    self.state = State::Failed;
                    return Err(e);
                }
            }
        }

        match next_central_record(&mut self.cursor, &mut self.buf, None).await {
            Ok(Some(header)) => {
                self.yielded += 1;
                Ok(Some(header))
            }
            Ok(None) => {
                self.state = State::Exhausted;
                if let Some(eocd) = &self.eocd {
                    if self.yielded != eocd.cd_records_total as u64 {
                        warn!(
                            declared = eocd.cd_records_total,
                            yielded = self.yielded,
                            "central directory record count differs from EOCD"
                        );
                    }
                }
                Ok(None)
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    async fn locate(&mut self) -> Result<(), ScanError> {
        let eocd = locate_eocd(&mut SeekWindow(self.cursor.stream_mut()), &self.opts).await?;
        let cd_offset = eocd.cd_offset as u64;
        self.cursor
            .stream_mut()
            .seek(SeekFrom::Start(cd_offset))
            .await
            .map_err(|e| ScanError::io(cd_offset, 0, e))?;
        self.cursor.set_position(cd_offset);
        debug!(cd_offset, "walking central directory (stream)");
        self.eocd = Some(eocd);
        self.state = State::AtRecord;
        Ok(())
    }

    /// Read the stored bytes of an already-yielded entry into memory,
    /// restoring the scan cursor afterwards.
    pub async fn read_entry(&mut self, header: &EntryHeader) -> Result<Vec<u8>, ScanError> {
        read_stream_entry(&mut self.cursor, header).await
    }

    /// Copy the stored bytes of an entry into `sink`, returning the count.
    pub async fn write_entry_to<W: tokio::io::AsyncWrite + Unpin>(
        &mut self,
        header: &EntryHeader,
        sink: &mut W,
    ) -> Result<u64, ScanError> {
        write_stream_entry(&mut self.cursor, header, sink).await
    }
}

/// Fixed central directory header fields, in wire order after the signature.
struct CentralFixed {
    made_by_version: u16,
    reader_version: u16,
    flags: u16,
    method: u16,
    last_mod_time: u16,
    last_mod_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name_len: u16,
    extra_len: u16,
    comment_len: u16,
    disk_number: u16,
    internal_attrs: u16,
    external_attrs: u32,
    local_header_offset: u32,
}

fn central_fixed(data: &[u8]) -> std::io::Result<CentralFixed> {
    let mut c = Cursor::new(data);
    Ok(CentralFixed {
        made_by_version: c.read_u16::<LittleEndian>()?,
        reader_version: c.read_u16::<LittleEndian>()?,
        flags: c.read_u16::<LittleEndian>()?,
        method: c.read_u16::<LittleEndian>()?,
        last_mod_time: c.read_u16::<LittleEndian>()?,
        last_mod_date: c.read_u16::<LittleEndian>()?,
        crc32: c.read_u32::<LittleEndian>()?,
        compressed_size: c.read_u32::<LittleEndian>()?,
        uncompressed_size: c.read_u32::<LittleEndian>()?,
        name_len: c.read_u16::<LittleEndian>()?,
        extra_len: c.read_u16::<LittleEndian>()?,
        comment_len: c.read_u16::<LittleEndian>()?,
        disk_number: c.read_u16::<LittleEndian>()?,
        internal_attrs: c.read_u16::<LittleEndian>()?,
        external_attrs: c.read_u32::<LittleEndian>()?,
        local_header_offset: c.read_u32::<LittleEndian>()?,
    })
}

/// Fixed local file header fields, in wire order after the signature.
struct LocalFixed {
    reader_version: u16,
    flags: u16,
    method: u16,
    last_mod_time: u16,
    last_mod_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name_len: u16,
    extra_len: u16,
}

fn local_fixed(data: &[u8]) -> std::io::Result<LocalFixed> {
    let mut c = Cursor::new(data);
    Ok(LocalFixed {
        reader_version: c.read_u16::<LittleEndian>()?,
        flags: c.read_u16::<LittleEndian>()?,
        method: c.read_u16::<LittleEndian>()?,
        last_mod_time: c.read_u16::<LittleEndian>()?,
        last_mod_date: c.read_u16::<LittleEndian>()?,
        crc32: c.read_u32::<LittleEndian>()?,
        compressed_size: c.read_u32::<LittleEndian>()?,
        uncompressed_size: c.read_u32::<LittleEndian>()?,
        name_len: c.read_u16::<LittleEndian>()?,
        extra_len: c.read_u16::<LittleEndian>()?,
    })
}

/// Decode one central directory record at the cursor, or `None` on the EOCD
/// signature (clean end of directory).
async fn next_central_record(
    cursor: &mut impl Fetch,
    buf: &mut Vec<u8>,
    origin: Option<&Weak<dyn ReadAt>>,
) -> Result<Option<EntryHeader>, ScanError> {
    let record_start = cursor.position();
    buf.clear();
    cursor.pull(buf, 4).await?;

    if &buf[..4] == EOCD_SIGNATURE {
        return Ok(None);
    }
    if &buf[..4] != CDFH_SIGNATURE {
        return Err(ScanError::malformed(
            record_start,
            "expected central directory file header signature",
        ));
    }

    cursor.pull(buf, CDFH_SIZE - 4).await?;
    let fixed = central_fixed(&buf[4..])
        .map_err(|e| ScanError::io(record_start, CDFH_SIZE, e))?;

    let name_len = fixed.name_len as usize;
    let extra_len = fixed.extra_len as usize;
    let comment_len = fixed.comment_len as usize;
    cursor.pull(buf, name_len + extra_len + comment_len).await?;

    let name_start = CDFH_SIZE;
    let extra_start = name_start + name_len;
    let comment_start = extra_start + extra_len;
    // Lossy conversion keeps non-UTF8 names listable.
    let name = String::from_utf8_lossy(&buf[name_start..extra_start]).to_string();

    Ok(Some(EntryHeader {
        made_by_version: fixed.made_by_version,
        reader_version: fixed.reader_version,
        flags: fixed.flags,
        method: CompressionMethod::from_u16(fixed.method),
        last_mod_time: fixed.last_mod_time,
        last_mod_date: fixed.last_mod_date,
        crc32: fixed.crc32,
        compressed_size: fixed.compressed_size,
        uncompressed_size: fixed.uncompressed_size,
        name,
        extra: buf[extra_start..comment_start].to_vec(),
        comment: buf[comment_start..].to_vec(),
        disk_number: fixed.disk_number,
        internal_attrs: fixed.internal_attrs,
        external_attrs: fixed.external_attrs,
        local_header_offset: fixed.local_header_offset as u64,
        next_offset: cursor.position(),
        source: origin.cloned(),
    }))
}

/// Decode one local file header at the cursor and skip its payload, or
/// `None` when the central directory (or a bare EOCD) begins here.
async fn next_local_record(
    cursor: &mut impl Fetch,
    buf: &mut Vec<u8>,
    origin: Option<&Weak<dyn ReadAt>>,
) -> Result<Option<EntryHeader>, ScanError> {
    let record_start = cursor.position();
    buf.clear();
    cursor.pull(buf, 4).await?;

    if &buf[..4] == CDFH_SIGNATURE || &buf[..4] == EOCD_SIGNATURE {
        return Ok(None);
    }
    if &buf[..4] != LFH_SIGNATURE {
        return Err(ScanError::malformed(
            record_start,
            "expected local file header signature",
        ));
    }

    cursor.pull(buf, LFH_SIZE - 4).await?;
    let fixed = local_fixed(&buf[4..]).map_err(|e| ScanError::io(record_start, LFH_SIZE, e))?;

    let name_len = fixed.name_len as usize;
    let extra_len = fixed.extra_len as usize;
    cursor.pull(buf, name_len + extra_len).await?;

    let name_start = LFH_SIZE;
    let extra_start = name_start + name_len;
    let name = String::from_utf8_lossy(&buf[name_start..extra_start]).to_string();

    // With a trailing data descriptor the local size may legitimately be
    // zero, and there is no way to find the next record without the central
    // directory. Refuse instead of guessing.
    if fixed.flags & FLAG_DATA_DESCRIPTOR != 0 && fixed.compressed_size == 0 {
        return Err(ScanError::Unsupported(format!(
            "entry {name:?} defers its sizes to a data descriptor; \
             forward scanning cannot skip its payload, use a central directory scan"
        )));
    }

    cursor.skip(fixed.compressed_size as u64).await?;

    Ok(Some(EntryHeader {
        made_by_version: 0,
        reader_version: fixed.reader_version,
        flags: fixed.flags,
        method: CompressionMethod::from_u16(fixed.method),
        last_mod_time: fixed.last_mod_time,
        last_mod_date: fixed.last_mod_date,
        crc32: fixed.crc32,
        compressed_size: fixed.compressed_size,
        uncompressed_size: fixed.uncompressed_size,
        name,
        extra: buf[extra_start..].to_vec(),
        comment: Vec::new(),
        disk_number: 0,
        internal_attrs: 0,
        external_attrs: 0,
        local_header_offset: record_start,
        next_offset: cursor.position(),
        source: origin.cloned(),
    }))
}

/// Seek to an entry's payload on a seekable stream, returning its absolute
/// start. The local header's own name/extra lengths are authoritative; some
/// writers let them differ from the central directory copy.
async fn seek_to_payload<S: AsyncRead + AsyncSeek + Unpin + Send>(
    cursor: &mut StreamCursor<S>,
    header: &EntryHeader,
) -> Result<(), ScanError> {
    let lfh_offset = header.local_header_offset;
    let stream = cursor.stream_mut();
    stream
        .seek(SeekFrom::Start(lfh_offset))
        .await
        .map_err(|e| ScanError::io(lfh_offset, LFH_SIZE, e))?;

    let mut lfh = [0u8; LFH_SIZE];
    match tokio::io::AsyncReadExt::read_exact(stream, &mut lfh).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ScanError::malformed(
                lfh_offset,
                "local file header extends past end of stream",
            ));
        }
        Err(e) => return Err(ScanError::io(lfh_offset, LFH_SIZE, e)),
    }
    if &lfh[..4] != LFH_SIGNATURE {
        return Err(ScanError::malformed(lfh_offset, "invalid local file header"));
    }

    let name_len = u16::from_le_bytes([lfh[26], lfh[27]]) as u64;
    let extra_len = u16::from_le_bytes([lfh[28], lfh[29]]) as u64;
    let data_offset = lfh_offset + LFH_SIZE as u64 + name_len + extra_len;
    stream
        .seek(SeekFrom::Start(data_offset))
        .await
        .map_err(|e| ScanError::io(data_offset, 0, e))?;
    Ok(())
}

/// Restore the scan cursor after a detour to an entry's payload.
async fn reseek_cursor<S: AsyncRead + AsyncSeek + Unpin + Send>(
    cursor: &mut StreamCursor<S>,
) -> Result<(), ScanError> {
    let pos = cursor.position();
    cursor
        .stream_mut()
        .seek(SeekFrom::Start(pos))
        .await
        .map_err(|e| ScanError::io(pos, 0, e))?;
    Ok(())
}

async fn read_stream_entry<S: AsyncRead + AsyncSeek + Unpin + Send>(
    cursor: &mut StreamCursor<S>,
    header: &EntryHeader,
) -> Result<Vec<u8>, ScanError> {
    seek_to_payload(cursor, header).await?;

    let len = header.compressed_size as usize;
    let mut data = vec![0u8; len];
    match tokio::io::AsyncReadExt::read_exact(cursor.stream_mut(), &mut data).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ScanError::malformed(
                header.local_header_offset,
                "stored data ends before its declared compressed size",
            ));
        }
        Err(e) => return Err(ScanError::io(header.local_header_offset, len, e)),
    }

    reseek_cursor(cursor).await?;
    Ok(data)
}

async fn write_stream_entry<S, W>(
    cursor: &mut StreamCursor<S>,
    header: &EntryHeader,
    sink: &mut W,
) -> Result<u64, ScanError>
where
    S: AsyncRead + AsyncSeek + Unpin + Send,
    W: tokio::io::AsyncWrite + Unpin,
{
    let data = read_stream_entry(cursor, header).await?;
    tokio::io::AsyncWriteExt::write_all(sink, &data)
        .await
        .map_err(|e| ScanError::io(header.local_header_offset, data.len(), e))?;
    Ok(data.len() as u64)
}
