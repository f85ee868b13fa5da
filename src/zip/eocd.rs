//! End of Central Directory locator.
//!
//! The EOCD sits at the very end of the archive, behind an optional comment
//! of up to 65535 bytes. Rather than reading the whole tail up front, the
//! locator walks backward in fixed-size chunks, prepending each chunk to the
//! bytes it has already fetched and searching only the newly covered region
//! for the signature.

use tracing::{debug, warn};

use super::error::ScanError;
use super::scan::ScanOptions;
use super::source::WindowRead;
use super::structures::{EOCD_SIGNATURE, EOCD_SIZE, EocdRecord};

/// Backward search chunk size.
pub(crate) const SEARCH_CHUNK: usize = 16 * 1024;

/// Default EOCD search budget. The maximum legal comment is 65535 bytes, so
/// scanning much further than that defeats the point of not reading the
/// whole file.
pub const DEFAULT_MAX_SEARCH: u64 = 1024 * 1024;

/// Find and decode the End of Central Directory record.
///
/// A signature-like byte pattern inside the comment itself is accepted as
/// the match, as mainstream readers do; the format offers no way to
/// disambiguate it.
pub(crate) async fn locate_eocd(
    src: &mut impl WindowRead,
    opts: &ScanOptions,
) -> Result<EocdRecord, ScanError> {
    let len = src.len().await?;
    if len < EOCD_SIZE as u64 {
        return Err(ScanError::NotFound { searched: len });
    }

    // Fast path: no comment means the EOCD starts exactly 22 bytes from the
    // end, and establishing the archive length already cost us a seek there.
    let mut fixed = [0u8; EOCD_SIZE];
    src.read_window(len - EOCD_SIZE as u64, &mut fixed).await?;
    if &fixed[0..4] == EOCD_SIGNATURE && fixed[20..22] == [0, 0] {
        let mut eocd = EocdRecord::from_bytes(&fixed, len - EOCD_SIZE as u64)?;
        check_directory_bounds(&eocd)?;
        if opts.keep_comment {
            eocd.comment = Some(Vec::new());
        }
        debug!(offset = eocd.offset, "EOCD found without comment");
        return Ok(eocd);
    }

    let budget = if opts.max_search == 0 || opts.max_search > len {
        len
    } else {
        opts.max_search
    };

    // `tail` holds [pos, len); each iteration prepends one more chunk. A
    // signature can straddle a chunk boundary by at most 3 bytes, so only
    // the first `chunk + 3` bytes of the merged buffer need searching.
    let mut tail: Vec<u8> = Vec::new();
    let mut pos = len;

    loop {
        let scanned = len - pos;
        if pos == 0 || scanned >= budget {
            debug!(scanned, budget, "EOCD search exhausted");
            return Err(ScanError::NotFound { searched: scanned });
        }

        let chunk = (SEARCH_CHUNK as u64).min(pos).min(budget - scanned) as usize;
        pos -= chunk as u64;

        let mut merged = vec![0u8; chunk];
        src.read_window(pos, &mut merged).await?;
        merged.extend_from_slice(&tail);
        tail = merged;

        let search_end = (chunk + 3).min(tail.len());
        for i in (0..search_end).rev() {
            if i + 4 > tail.len() || &tail[i..i + 4] != EOCD_SIGNATURE {
                continue;
            }
            let at = pos + i as u64;
            if at + EOCD_SIZE as u64 > len {
                // Too close to the end to be a real record.
                continue;
            }
            return finish(&tail[i..], at, len, opts);
        }
    }
}

/// Decode the record at the signature match and recover the comment.
fn finish(
    tail: &[u8],
    at: u64,
    len: u64,
    opts: &ScanOptions,
) -> Result<EocdRecord, ScanError> {
    let mut eocd = EocdRecord::from_bytes(&tail[..EOCD_SIZE], at)?;
    check_directory_bounds(&eocd)?;

    // The accumulated tail always extends to the end of the archive, so the
    // comment bytes are already in hand.
    let available = len - at - EOCD_SIZE as u64;
    let declared = eocd.comment_len as u64;
    if declared > available {
        return Err(ScanError::malformed(
            at,
            format!("declared comment of {declared} bytes but only {available} remain"),
        ));
    }
    if declared < available {
        warn!(at, declared, available, "trailing bytes after archive comment");
    }
    if opts.keep_comment {
        let start = EOCD_SIZE;
        eocd.comment = Some(tail[start..start + declared as usize].to_vec());
    }

    debug!(offset = at, comment_len = declared, "EOCD located");
    Ok(eocd)
}

fn check_directory_bounds(eocd: &EocdRecord) -> Result<(), ScanError> {
    let end = eocd.cd_offset as u64 + eocd.cd_size as u64;
    if end > eocd.offset {
        return Err(ScanError::malformed(
            eocd.offset,
            format!(
                "central directory [{:#x}, {end:#x}) overruns its own EOCD",
                eocd.cd_offset
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::zip::source::RangeWindow;

    fn bare_eocd(comment: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(EOCD_SIGNATURE);
        data.extend_from_slice(&[0; 12]); // disks, counts, cd size
        data.extend_from_slice(&0u32.to_le_bytes()); // cd offset
        data.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        data.extend_from_slice(comment);
        data
    }

    #[tokio::test]
    async fn fast_path_without_comment() {
        let reader = MemoryReader::new(bare_eocd(b""));
        let eocd = locate_eocd(&mut RangeWindow(&reader), &ScanOptions::default())
            .await
            .unwrap();
        assert_eq!(eocd.offset, 0);
        assert_eq!(eocd.comment, None);
    }

    #[tokio::test]
    async fn comment_recovered_byte_for_byte() {
        let comment: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let reader = MemoryReader::new(bare_eocd(&comment));
        let opts = ScanOptions {
            keep_comment: true,
            ..ScanOptions::default()
        };
        let eocd = locate_eocd(&mut RangeWindow(&reader), &opts).await.unwrap();
        assert_eq!(eocd.comment.as_deref(), Some(comment.as_slice()));
    }

    #[tokio::test]
    async fn tiny_input_is_not_found() {
        let reader = MemoryReader::new(b"PK".to_vec());
        assert!(matches!(
            locate_eocd(&mut RangeWindow(&reader), &ScanOptions::default()).await,
            Err(ScanError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn budget_stops_the_search() {
        let mut data = vec![0u8; 64 * 1024];
        let eocd = bare_eocd(&vec![b'c'; 40 * 1024]);
        data.extend_from_slice(&eocd);
        // Place the EOCD signature 40 KiB + 22 from the end, budget 8 KiB.
        let reader = MemoryReader::new(data);
        let opts = ScanOptions {
            max_search: 8 * 1024,
            ..ScanOptions::default()
        };
        match locate_eocd(&mut RangeWindow(&reader), &opts).await {
            Err(ScanError::NotFound { searched }) => assert!(searched <= 8 * 1024),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn directory_overrun_is_malformed() {
        let mut data = Vec::new();
        data.extend_from_slice(EOCD_SIGNATURE);
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&100u32.to_le_bytes()); // cd size
        data.extend_from_slice(&0u32.to_le_bytes()); // cd offset
        data.extend_from_slice(&0u16.to_le_bytes());
        let reader = MemoryReader::new(data);
        assert!(matches!(
            locate_eocd(&mut RangeWindow(&reader), &ScanOptions::default()).await,
            Err(ScanError::Malformed { .. })
        ));
    }
}
