mod common;

use common::{ArchiveBuilder, default_zip};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zipscan::{
    CompressionMethod, EntryHeader, MemoryReader, ScanError, ScanOptions, ZipScanner, scan_stream,
    scan_stream_central,
};

fn scanner_for(data: Vec<u8>) -> ZipScanner<MemoryReader> {
    ZipScanner::new(Arc::new(MemoryReader::new(data)))
}

async fn collect_central(scanner: &ZipScanner<MemoryReader>) -> Vec<EntryHeader> {
    let mut scan = scanner.scan_central(ScanOptions::default());
    let mut entries = Vec::new();
    while let Some(entry) = scan.next_entry().await.unwrap() {
        entries.push(entry);
    }
    entries
}

#[tokio::test]
async fn central_scan_yields_every_entry() {
    let mut builder = ArchiveBuilder::new();
    builder
        .add("alpha.txt", b"first payload")
        .add("beta/gamma.bin", &[0u8; 513])
        .add("empty.txt", b"")
        .add("dir/", b"");

    let scanner = scanner_for(builder.build());
    let entries = collect_central(&scanner).await;

    assert_eq!(entries.len(), 4);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.local_header_offset, builder.lfh_offset_of(i));
        assert_eq!(entry.crc32, builder.crc_of(i));
        assert_eq!(entry.compressed_size as usize, builder.payload_of(i).len());
        assert_eq!(entry.method, CompressionMethod::Stored);
    }
    assert_eq!(entries[0].name, "alpha.txt");
    assert_eq!(entries[1].name, "beta/gamma.bin");
    assert!(entries[3].is_directory());
    assert_eq!(entries[0].mod_date(), (2024, 6, 15));
}

#[tokio::test]
async fn central_order_follows_directory_not_paths() {
    let builder = default_zip();
    let scanner = scanner_for(builder.build());
    let entries = collect_central(&scanner).await;

    let listed: Vec<(&str, u64)> = entries
        .iter()
        .map(|e| (e.name.as_str(), e.local_header_offset))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("test/a.txt", 0x0),
            ("test/path/b.txt", 0x245),
            ("test/another/path/c.txt", 0xc6),
        ]
    );
}

#[tokio::test]
async fn forward_scan_agrees_with_central_scan() {
    let builder = default_zip();
    let data = builder.build();
    let scanner = scanner_for(data);

    let central = collect_central(&scanner).await;

    let mut forward = Vec::new();
    let mut scan = scanner.scan_forward(ScanOptions::default());
    while let Some(entry) = scan.next_entry().await.unwrap() {
        forward.push(entry);
    }

    // Forward order is physical order.
    let names: Vec<&str> = forward.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["test/a.txt", "test/another/path/c.txt", "test/path/b.txt"]
    );

    // Per entry, both drivers report the same CRC and offsets.
    for f in &forward {
        let c = central.iter().find(|c| c.name == f.name).unwrap();
        assert_eq!(c.crc32, f.crc32);
        assert_eq!(c.local_header_offset, f.local_header_offset);
        assert_eq!(c.compressed_size, f.compressed_size);
    }
}

#[tokio::test]
async fn independent_scans_are_identical() {
    let builder = default_zip();
    let scanner = scanner_for(builder.build());

    let first = collect_central(&scanner).await;
    let second = collect_central(&scanner).await;

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.local_header_offset, b.local_header_offset);
        assert_eq!(a.crc32, b.crc32);
        assert_eq!(a.next_record_offset(), b.next_record_offset());
    }
}

#[tokio::test]
async fn open_returns_exactly_the_stored_bytes() {
    let mut builder = ArchiveBuilder::new();
    builder
        .add("a.bin", &(0..=255u8).collect::<Vec<_>>())
        .add("b.bin", b"short");

    let scanner = scanner_for(builder.build());
    let entries = collect_central(&scanner).await;

    for (i, entry) in entries.iter().enumerate() {
        let mut handle = entry.open().await.unwrap();
        assert_eq!(handle.remaining(), entry.compressed_size as u64);

        // Drain through a deliberately small buffer.
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = handle.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out.len(), entry.compressed_size as usize);
        assert_eq!(out, builder.payload_of(i));
    }

    // write_to drains the full payload as well.
    let mut sink = Vec::new();
    let written = entries[0].write_to(&mut sink).await.unwrap();
    assert_eq!(written, entries[0].compressed_size as u64);
    assert_eq!(sink, builder.payload_of(0));
}

#[tokio::test]
async fn open_can_outlive_the_scan_but_not_the_source() {
    let mut builder = ArchiveBuilder::new();
    builder.add("keep.txt", b"still here");
    let data = builder.build();

    let scanner = scanner_for(data.clone());
    let entries = collect_central(&scanner).await;
    // The scan is gone; the header still opens through the live source.
    let mut handle = entries[0].open().await.unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 32];
    loop {
        let n = handle.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, b"still here");

    // Dropping the source invalidates the weak reference deterministically.
    drop(handle);
    drop(scanner);
    assert!(matches!(
        entries[0].open().await,
        Err(ScanError::Unsupported(_))
    ));
}

#[tokio::test]
async fn eocd_found_across_comment_sizes() {
    // Straddle the 16 KiB search chunk boundaries from both sides.
    let mut lengths = vec![8188usize, 8192, 8196];
    for base in [16384usize, 32768, 49152] {
        for delta in 1..=4 {
            lengths.push(base - delta);
            lengths.push(base + delta);
        }
        lengths.push(base);
    }

    for len in lengths {
        let comment: Vec<u8> = (0..len).map(|i| (i % 37) as u8 + b'A').collect();
        let mut builder = ArchiveBuilder::new();
        builder.add("x.txt", b"payload").comment(&comment);
        let scanner = scanner_for(builder.build());

        let opts = ScanOptions {
            keep_comment: true,
            ..ScanOptions::default()
        };
        let eocd = scanner.locate_eocd(&opts).await.unwrap_or_else(|e| {
            panic!("comment len {len}: {e}");
        });
        assert_eq!(eocd.comment_len as usize, len, "comment len {len}");
        assert_eq!(eocd.comment.as_deref(), Some(comment.as_slice()));
        assert_eq!(eocd.cd_records_total, 1);

        // The scan itself still walks the directory.
        let entries = collect_central(&scanner).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "x.txt");
    }
}

#[tokio::test]
async fn corrupted_or_missing_eocd_is_not_found() {
    let mut builder = ArchiveBuilder::new();
    builder.add("x.txt", b"data");
    let good = builder.build();

    // Flip one EOCD signature byte.
    let mut corrupted = good.clone();
    let eocd_at = good.len() - 22;
    corrupted[eocd_at + 1] ^= 0xFF;
    let scanner = scanner_for(corrupted);
    let mut scan = scanner.scan_central(ScanOptions::default());
    assert!(matches!(
        scan.next_entry().await,
        Err(ScanError::NotFound { .. })
    ));
    // Terminal: the scan stays finished.
    assert!(scan.next_entry().await.unwrap().is_none());

    // Truncate the EOCD off entirely.
    let truncated = good[..good.len() - 22].to_vec();
    let scanner = scanner_for(truncated);
    let mut scan = scanner.scan_central(ScanOptions::default());
    assert!(matches!(
        scan.next_entry().await,
        Err(ScanError::NotFound { .. })
    ));
}

#[tokio::test]
async fn corrupted_directory_record_halts_iteration() {
    let mut builder = ArchiveBuilder::new();
    builder.add("one.txt", b"1").add("two.txt", b"22");
    let mut data = builder.build();

    // Corrupt the second CDFH signature. The first directory record is
    // 46 + "one.txt".len() bytes into the directory.
    let scanner = scanner_for(data.clone());
    let eocd = scanner
        .locate_eocd(&ScanOptions::default())
        .await
        .unwrap();
    let second = eocd.cd_offset as usize + 46 + "one.txt".len();
    data[second] = b'X';

    let scanner = scanner_for(data);
    let mut scan = scanner.scan_central(ScanOptions::default());

    let first = scan.next_entry().await.unwrap().unwrap();
    assert_eq!(first.name, "one.txt");

    match scan.next_entry().await {
        Err(ScanError::Malformed { offset, .. }) => {
            assert_eq!(offset, second as u64);
        }
        other => panic!("expected Malformed, got {other:?}"),
    }

    // No fabricated records after the failure.
    assert!(scan.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn cancellation_stops_at_a_record_boundary() {
    let builder = default_zip();
    let scanner = scanner_for(builder.build());

    let token = CancellationToken::new();
    let opts = ScanOptions {
        cancel: Some(token.clone()),
        ..ScanOptions::default()
    };
    let mut scan = scanner.scan_central(opts);

    let first = scan.next_entry().await.unwrap().unwrap();
    assert_eq!(first.name, "test/a.txt");

    token.cancel();
    assert!(matches!(scan.next_entry().await, Err(ScanError::Cancelled)));
    // The already-yielded record stays usable.
    assert_eq!(first.local_header_offset, 0);
    assert!(scan.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn central_scan_resumes_from_a_saved_offset() {
    let builder = default_zip();
    let scanner = scanner_for(builder.build());

    let mut scan = scanner.scan_central(ScanOptions::default());
    let first = scan.next_entry().await.unwrap().unwrap();
    drop(scan);

    let mut resumed = scanner.scan_central_at(first.next_record_offset(), ScanOptions::default());
    let second = resumed.next_entry().await.unwrap().unwrap();
    let third = resumed.next_entry().await.unwrap().unwrap();
    assert_eq!(second.name, "test/path/b.txt");
    assert_eq!(third.name, "test/another/path/c.txt");
    assert!(resumed.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn empty_archive_scans_cleanly() {
    let builder = ArchiveBuilder::new();
    let scanner = scanner_for(builder.build());

    let mut central = scanner.scan_central(ScanOptions::default());
    assert!(central.next_entry().await.unwrap().is_none());
    assert_eq!(central.eocd().unwrap().cd_records_total, 0);

    let mut forward = scanner.scan_forward(ScanOptions::default());
    assert!(forward.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn stream_forward_scan_walks_local_headers() {
    let builder = default_zip();
    let data = builder.build();

    let mut scan = scan_stream(std::io::Cursor::new(data), ScanOptions::default());
    let mut names = Vec::new();
    while let Some(entry) = scan.next_entry().await.unwrap() {
        // Stream headers have no random-access backing to open.
        assert!(matches!(
            entry.open().await,
            Err(ScanError::Unsupported(_))
        ));
        names.push(entry.name);
    }
    assert_eq!(
        names,
        vec!["test/a.txt", "test/another/path/c.txt", "test/path/b.txt"]
    );
}

#[tokio::test]
async fn seekable_stream_central_scan_reads_entries_out_of_order() {
    let builder = default_zip();
    let data = builder.build();

    let mut scan = scan_stream_central(std::io::Cursor::new(data), ScanOptions::default());
    let mut headers = Vec::new();
    while let Some(entry) = scan.next_entry().await.unwrap() {
        headers.push(entry);
    }
    assert_eq!(headers.len(), 3);
    assert_eq!(scan.eocd().unwrap().cd_records_total, 3);

    // Earlier-yielded entries stay readable after the cursor moved on.
    let a = scan.read_entry(&headers[0]).await.unwrap();
    assert_eq!(a, builder.payload_of(0));

    let mut sink = Vec::new();
    let written = scan.write_entry_to(&headers[2], &mut sink).await.unwrap();
    assert_eq!(written, headers[2].compressed_size as u64);
    assert_eq!(sink, builder.payload_of(1)); // c.txt was added second
}

#[tokio::test]
async fn seekable_stream_scan_interleaves_reads_with_iteration() {
    let builder = default_zip();
    let data = builder.build();

    let mut scan = scan_stream_central(std::io::Cursor::new(data), ScanOptions::default());
    let first = scan.next_entry().await.unwrap().unwrap();
    let payload = scan.read_entry(&first).await.unwrap();
    assert_eq!(payload, builder.payload_of(0));

    // The detour restored the cursor; iteration continues unharmed.
    let second = scan.next_entry().await.unwrap().unwrap();
    assert_eq!(second.name, "test/path/b.txt");
}

#[tokio::test]
async fn forward_scan_refuses_descriptor_entries_without_sizes() {
    let mut builder = ArchiveBuilder::new();
    builder.add("streamed.bin", b"whatever bytes");
    let mut data = builder.build();

    // Patch the local header at offset 0: set the data-descriptor flag and
    // zero the compressed size, as streaming writers do.
    data[6] = 0x08;
    data[18..22].copy_from_slice(&0u32.to_le_bytes());

    let scanner = scanner_for(data.clone());
    let mut scan = scanner.scan_forward(ScanOptions::default());
    assert!(matches!(
        scan.next_entry().await,
        Err(ScanError::Unsupported(_))
    ));

    // The central directory still has the real sizes, so a CD scan works.
    let scanner = scanner_for(data);
    let entries = collect_central(&scanner).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].compressed_size as usize, b"whatever bytes".len());
}

#[tokio::test]
async fn overstated_eocd_count_is_tolerated() {
    let mut builder = ArchiveBuilder::new();
    builder.add("one.txt", b"1").add("two.txt", b"22");
    let mut data = builder.build();

    // Overstate both record counts in the EOCD; the directory walk's own
    // framing is authoritative.
    let eocd_at = data.len() - 22;
    data[eocd_at + 8..eocd_at + 10].copy_from_slice(&9u16.to_le_bytes());
    data[eocd_at + 10..eocd_at + 12].copy_from_slice(&9u16.to_le_bytes());

    let scanner = scanner_for(data);
    let mut scan = scanner.scan_central(ScanOptions::default());
    let mut names = Vec::new();
    while let Some(entry) = scan.next_entry().await.unwrap() {
        names.push(entry.name);
    }
    assert_eq!(names, vec!["one.txt", "two.txt"]);
    assert_eq!(scan.eocd().unwrap().cd_records_total, 9);
    // Still a clean exhaustion, not an error.
    assert!(scan.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn trailing_bytes_after_comment_are_tolerated() {
    let mut builder = ArchiveBuilder::new();
    builder.add("x.txt", b"data").comment(b"hello");
    let mut data = builder.build();
    // Junk past the declared comment, as appended self-extractors leave.
    data.extend_from_slice(&[0xEE; 64]);

    let scanner = scanner_for(data);
    let opts = ScanOptions {
        keep_comment: true,
        ..ScanOptions::default()
    };
    let eocd = scanner.locate_eocd(&opts).await.unwrap();
    assert_eq!(eocd.comment_len, 5);
    assert_eq!(eocd.comment.as_deref(), Some(b"hello".as_slice()));

    let entries = collect_central(&scanner).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "x.txt");
}

#[tokio::test]
async fn search_budget_bounds_the_eocd_scan() {
    let comment = vec![b'z'; 40_000];
    let mut builder = ArchiveBuilder::new();
    builder.add("x.txt", b"data").comment(&comment);
    let scanner = scanner_for(builder.build());

    let opts = ScanOptions {
        max_search: 4096,
        ..ScanOptions::default()
    };
    assert!(matches!(
        scanner.locate_eocd(&opts).await,
        Err(ScanError::NotFound { .. })
    ));

    // Unbounded search still finds it.
    let opts = ScanOptions {
        max_search: 0,
        ..ScanOptions::default()
    };
    assert!(scanner.locate_eocd(&opts).await.is_ok());
}
