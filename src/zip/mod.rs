//! ZIP archive metadata scanning.
//!
//! This module locates and decodes the metadata records of a ZIP archive
//! directly from raw bytes, without building a full in-memory model of the
//! archive.
//!
//! ## Architecture
//!
//! - [`structures`]: decoded record types (EOCD, entry headers) and the
//!   format's signatures
//! - [`eocd`]: backward chunked search for the End of Central Directory
//! - [`scan`]: the four lazy scan drivers and their shared record walkers
//! - [`entry`]: readable handles over an entry's stored bytes
//! - [`source`]: cursors adapting sequential and random-access byte sources
//!   to the walkers' "read N more bytes" needs
//!
//! ## ZIP format overview
//!
//! A ZIP file consists of:
//! 1. Local file headers, each followed by that entry's compressed data
//! 2. A Central Directory with metadata for all entries
//! 3. An End of Central Directory (EOCD) record at the very end
//!
//! Central-directory scans read the EOCD first (searching backward from the
//! end of the file), then walk the directory it points at. This lists an
//! archive's contents from a handful of small reads, which is what makes
//! HTTP Range sources practical. Forward scans instead walk the local file
//! headers from offset 0, for sources that cannot seek at all.
//!
//! ## Supported
//!
//! - Standard ZIP format central/local/EOCD records, little-endian
//! - Archives with comments up to the format's 65535-byte limit
//! - Lazy iteration with cooperative cancellation
//!
//! ## Limitations
//!
//! - ZIP64 and multi-disk values are reported as stored, never resolved
//! - Encrypted entries are reported but their payload is opaque
//! - No decompression: `open` yields the stored bytes as-is

mod entry;
mod eocd;
mod error;
mod scan;
mod source;
mod structures;

pub use entry::RawEntry;
pub use eocd::DEFAULT_MAX_SEARCH;
pub use error::ScanError;
pub use scan::{
    CentralScan, CentralStreamScan, ForwardScan, ScanOptions, StreamScan, ZipScanner, scan_stream,
    scan_stream_central,
};
pub use structures::{
    CDFH_SIGNATURE, CDFH_SIZE, CompressionMethod, EOCD_SIGNATURE, EOCD_SIZE, EntryHeader,
    EocdRecord, LFH_SIGNATURE, LFH_SIZE,
};
