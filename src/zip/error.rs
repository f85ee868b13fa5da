use thiserror::Error;

/// Errors produced while locating or decoding archive metadata.
///
/// Any error terminates the scan that produced it; malformed bytes do not
/// become well-formed on a second read, so no retry is attempted internally.
/// I/O retry policy belongs to the byte source (see
/// [`HttpRangeReader`](crate::HttpRangeReader)).
#[derive(Debug, Error)]
pub enum ScanError {
    /// No End of Central Directory signature was found within the search
    /// budget. The input is not a ZIP archive, or is truncated past its EOCD.
    #[error("no end-of-central-directory signature found ({searched} bytes scanned)")]
    NotFound {
        /// Total bytes examined before giving up.
        searched: u64,
    },

    /// A structural rule of the format was violated: a signature mismatch at
    /// an expected position, or declared lengths exceeding the available bytes.
    #[error("malformed archive at offset {offset:#x}: {reason}")]
    Malformed { offset: u64, reason: String },

    /// The requested operation violates the capability contract of the
    /// underlying byte source, e.g. `open` on a header produced by a
    /// sequential stream scan.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A read from the underlying byte source failed. Carries the offset and
    /// length of the attempted read for context.
    #[error("read of {len} bytes at offset {offset:#x} failed: {cause}")]
    Io {
        offset: u64,
        len: usize,
        cause: anyhow::Error,
    },

    /// Cooperative cancellation was observed at a record boundary. Records
    /// yielded before this point remain valid.
    #[error("scan cancelled")]
    Cancelled,
}

impl ScanError {
    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        ScanError::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(offset: u64, len: usize, cause: impl Into<anyhow::Error>) -> Self {
        ScanError::Io {
            offset,
            len,
            cause: cause.into(),
        }
    }
}
