//! # zipscan
//!
//! Scan ZIP archive metadata from raw bytes, without a full in-memory model.
//!
//! This library locates and decodes an archive's End of Central Directory,
//! Central Directory and Local File Header records from any byte source:
//! local files, in-memory buffers, or remote HTTP servers via Range
//! requests. Scans are lazy, so listing a few entries of a large remote
//! archive costs a handful of small ranged reads rather than a download.
//!
//! ## Features
//!
//! - Central-directory scans (EOCD-based) and forward local-header scans
//! - Random-access sources (`ReadAt`) and sequential `AsyncRead` streams
//! - `open`/`write_to` handles over an entry's stored bytes, concurrency-safe
//!   on random-access sources
//! - Cooperative cancellation between records
//!
//! Decompression is out of scope: handles yield the stored bytes exactly as
//! written, and [`EntryHeader::method`] tells the caller which codec to apply.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipscan::{HttpRangeReader, ScanOptions, ZipScanner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Scan a remote archive without downloading it
//!     let reader = Arc::new(HttpRangeReader::new("https://example.com/archive.zip".to_string()).await?);
//!     let scanner = ZipScanner::new(reader);
//!
//!     let mut scan = scanner.scan_central(ScanOptions::default());
//!     while let Some(entry) = scan.next_entry().await? {
//!         println!("{} ({} bytes)", entry.name, entry.uncompressed_size);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use zip::{
    CentralScan, CentralStreamScan, CompressionMethod, EntryHeader, EocdRecord, ForwardScan,
    RawEntry, ScanError, ScanOptions, StreamScan, ZipScanner, scan_stream, scan_stream_central,
};
