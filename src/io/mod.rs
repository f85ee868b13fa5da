mod http;
mod local;
mod memory;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for random access reading from a data source.
///
/// Implementations take `&self`: a source is read-only shared state, safe for
/// concurrent independent reads by any number of scans and entry opens. Retry
/// and timeout policy belongs behind this trait (see [`HttpRangeReader`]),
/// never in the parsers above it.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer, returning the
    /// number of bytes read. A return of 0 means end of source.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source.
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`, failing on a short read.
    async fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.read_at(offset, buf).await?;
            if n == 0 {
                bail!("unexpected end of source at offset {offset:#x}");
            }
            offset += n as u64;
            buf = &mut buf[n..];
        }
        Ok(())
    }
}
