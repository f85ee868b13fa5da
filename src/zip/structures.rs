use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::sync::Weak;

use super::error::ScanError;
use crate::io::ReadAt;

/// ZIP compression methods.
///
/// The scanner only reports the method; selecting a codec for the stored
/// bytes is the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory record signature (`0x06054b50` little-endian).
pub const EOCD_SIGNATURE: &[u8] = b"PK\x05\x06";
/// Fixed size of the EOCD record, excluding the trailing comment.
pub const EOCD_SIZE: usize = 22;

/// Central Directory File Header signature (`0x02014b50` little-endian).
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
/// Fixed size of a CDFH, excluding name/extra/comment.
pub const CDFH_SIZE: usize = 46;

/// Local File Header signature (`0x04034b50` little-endian).
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
/// Fixed size of an LFH, excluding name/extra.
pub const LFH_SIZE: usize = 30;

/// General-purpose flag bit 0: the entry is encrypted.
pub(crate) const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General-purpose flag bit 3: sizes live in a trailing data descriptor and
/// the local header copies may be zero.
pub(crate) const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Decoded End of Central Directory record.
///
/// Multi-disk and ZIP64 sentinel values (`0xFFFF`/`0xFFFFFFFF`) are stored
/// exactly as read and not resolved further.
#[derive(Debug, Clone)]
pub struct EocdRecord {
    pub disk_number: u16,
    pub cd_start_disk: u16,
    pub cd_records_on_disk: u16,
    pub cd_records_total: u16,
    /// Central Directory size in bytes.
    pub cd_size: u32,
    /// Absolute offset of the Central Directory, relative to archive start.
    pub cd_offset: u32,
    pub comment_len: u16,
    /// Archive comment bytes, populated only when the locator was asked to
    /// keep them.
    pub comment: Option<Vec<u8>>,
    /// Absolute offset at which the EOCD record itself begins.
    pub offset: u64,
}

impl EocdRecord {
    /// Decode the fixed 22-byte record found at absolute `offset`.
    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self, ScanError> {
        if data.len() < EOCD_SIZE || &data[0..4] != EOCD_SIGNATURE {
            return Err(ScanError::malformed(
                offset,
                "invalid end-of-central-directory record",
            ));
        }

        let mut cursor = Cursor::new(&data[4..]);
        let read = |e: std::io::Error| ScanError::io(offset, EOCD_SIZE, e);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>().map_err(read)?,
            cd_start_disk: cursor.read_u16::<LittleEndian>().map_err(read)?,
            cd_records_on_disk: cursor.read_u16::<LittleEndian>().map_err(read)?,
            cd_records_total: cursor.read_u16::<LittleEndian>().map_err(read)?,
            cd_size: cursor.read_u32::<LittleEndian>().map_err(read)?,
            cd_offset: cursor.read_u32::<LittleEndian>().map_err(read)?,
            comment_len: cursor.read_u16::<LittleEndian>().map_err(read)?,
            comment: None,
            offset,
        })
    }
}

/// A decoded archive entry header.
///
/// One struct serves both decoders: Central Directory records populate every
/// field; Local File Header records carry no comment or attribute data, so
/// `made_by_version`, `comment`, `disk_number` and the attribute fields stay
/// at their zero values, and `local_header_offset` is the scan position where
/// the header was encountered.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub made_by_version: u16,
    pub reader_version: u16,
    pub flags: u16,
    pub method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    /// CRC-32 of the decompressed payload, exactly as stored.
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: String,
    pub extra: Vec<u8>,
    /// Entry comment; always empty for local-header records.
    pub comment: Vec<u8>,
    pub disk_number: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    /// Absolute offset of this entry's Local File Header.
    pub local_header_offset: u64,
    /// Absolute offset of the record following this one, kept so a scan can
    /// be resumed after an early exit.
    pub(crate) next_offset: u64,
    /// Non-owning reference back to the random-access source that yielded
    /// this header, used to service `open`. `None` for stream scans.
    pub(crate) source: Option<Weak<dyn ReadAt>>,
}

impl EntryHeader {
    /// Directory entries end with `/` by convention.
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Whether the sizes were written to a trailing data descriptor. When
    /// set, the local header's `compressed_size` may be zero and forward
    /// scanning cannot skip past the payload reliably.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Absolute offset of the record that follows this one, usable with
    /// [`ZipScanner::scan_central_at`](super::ZipScanner::scan_central_at)
    /// to resume an interrupted directory walk.
    pub fn next_record_offset(&self) -> u64 {
        self.next_offset
    }

    /// Parse the packed MS-DOS modification date to (year, month, day).
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse the packed MS-DOS modification time to (hour, minute, second).
    /// The stored resolution is 2 seconds.
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}
