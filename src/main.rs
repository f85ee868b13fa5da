//! Main entry point for the zipscan CLI.
//!
//! Lists ZIP archive metadata from local files or remote HTTP URLs. Remote
//! archives are never downloaded: the scanner reads the EOCD and central
//! directory through Range requests and prints entries as they decode.

use anyhow::{Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use zipscan::{
    Cli, CompressionMethod, EntryHeader, HttpRangeReader, LocalFileReader, ReadAt, ScanOptions,
    ZipScanner,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut opts = ScanOptions::default();
    if let Some(max_search) = cli.max_search {
        opts.max_search = max_search;
    }
    opts.keep_comment = cli.comment;

    if cli.is_http_url() {
        let reader = HttpRangeReader::new(cli.file.clone()).await?;
        let transferred_before = reader.transferred_bytes();
        let reader = Arc::new(reader);

        process_archive(reader.clone(), &cli, opts).await?;

        // Show how little of the remote archive was actually fetched
        if !cli.quiet {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let reader = Arc::new(LocalFileReader::new(Path::new(&cli.file))?);
        process_archive(reader, &cli, opts).await?;
    }

    Ok(())
}

/// Scan the archive and either list entries or dump one of them.
async fn process_archive<R: ReadAt + 'static>(
    reader: Arc<R>,
    cli: &Cli,
    opts: ScanOptions,
) -> Result<()> {
    let scanner = ZipScanner::new(reader);

    if let Some(name) = &cli.pipe {
        return dump_entry(&scanner, name, opts).await;
    }

    if cli.forward {
        list_forward(&scanner, cli, opts).await
    } else {
        list_central(&scanner, cli, opts).await
    }
}

/// List entries by walking the central directory.
async fn list_central<R: ReadAt + 'static>(
    scanner: &ZipScanner<R>,
    cli: &Cli,
    opts: ScanOptions,
) -> Result<()> {
    let mut totals = Totals::default();
    print_header(cli.verbose);

    let mut scan = scanner.scan_central(opts);
    while let Some(entry) = scan.next_entry().await? {
        print_entry(&entry, cli.verbose);
        totals.add(&entry);
    }
    print_summary(&totals, cli);

    if cli.comment {
        if let Some(comment) = scan.eocd().and_then(|eocd| eocd.comment.as_deref()) {
            if !comment.is_empty() {
                println!("\nArchive comment:\n{}", String::from_utf8_lossy(comment));
            }
        }
    }

    Ok(())
}

/// List entries by walking local file headers from the start of the file.
async fn list_forward<R: ReadAt + 'static>(
    scanner: &ZipScanner<R>,
    cli: &Cli,
    opts: ScanOptions,
) -> Result<()> {
    let mut totals = Totals::default();
    print_header(cli.verbose);

    let mut scan = scanner.scan_forward(opts);
    while let Some(entry) = scan.next_entry().await? {
        print_entry(&entry, cli.verbose);
        totals.add(&entry);
    }
    print_summary(&totals, cli);

    Ok(())
}

/// Write one entry's stored (still-compressed) bytes to stdout.
async fn dump_entry<R: ReadAt + 'static>(
    scanner: &ZipScanner<R>,
    name: &str,
    opts: ScanOptions,
) -> Result<()> {
    let mut scan = scanner.scan_central(opts);
    while let Some(entry) = scan.next_entry().await? {
        if entry.name == name {
            let mut stdout = tokio::io::stdout();
            let written = entry.write_to(&mut stdout).await?;
            tracing::debug!(written, name, "entry dumped");
            return Ok(());
        }
    }
    bail!("entry not found in archive: {name}");
}

#[derive(Default)]
struct Totals {
    uncompressed: u64,
    compressed: u64,
    files: usize,
}

impl Totals {
    fn add(&mut self, entry: &EntryHeader) {
        if !entry.is_directory() {
            self.uncompressed += entry.uncompressed_size as u64;
            self.compressed += entry.compressed_size as u64;
            self.files += 1;
        }
    }
}

fn method_name(method: CompressionMethod) -> String {
    match method {
        CompressionMethod::Stored => "Stored".to_string(),
        CompressionMethod::Deflate => "Defl".to_string(),
        CompressionMethod::Unknown(v) => format!("#{v}"),
    }
}

fn print_header(verbose: bool) {
    if verbose {
        println!(
            "{:>10}  {:>6}  {:>10}  {:>5}  {:>10}  {:>5}  {:>8}  {:>10}  Name",
            "Length", "Method", "Size", "Cmpr", "Date", "Time", "CRC-32", "Offset"
        );
        println!("{}", "-".repeat(96));
    }
}

fn print_entry(entry: &EntryHeader, verbose: bool) {
    if !verbose {
        println!("{}", entry.name);
        return;
    }

    let (year, month, day) = entry.mod_date();
    let (hour, minute, _second) = entry.mod_time();

    let ratio = if entry.uncompressed_size > 0 {
        let saved = 100u64
            .saturating_sub(entry.compressed_size as u64 * 100 / entry.uncompressed_size as u64);
        format!("{saved:>4}%")
    } else {
        "  0%".to_string()
    };

    println!(
        "{:>10}  {:>6}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {:08x}  {:#10x}  {}",
        entry.uncompressed_size,
        method_name(entry.method),
        entry.compressed_size,
        ratio,
        year,
        month,
        day,
        hour,
        minute,
        entry.crc32,
        entry.local_header_offset,
        entry.name
    );
}

fn print_summary(totals: &Totals, cli: &Cli) {
    if !cli.verbose || cli.quiet {
        return;
    }
    println!("{}", "-".repeat(96));
    let ratio = if totals.uncompressed > 0 {
        let saved = 100u64.saturating_sub(totals.compressed * 100 / totals.uncompressed);
        format!("{saved:>4}%")
    } else {
        "  0%".to_string()
    };
    println!(
        "{:>10}  {:>6}  {:>10}  {}  {:>39}  {} files",
        totals.uncompressed, "", totals.compressed, ratio, "", totals.files
    );
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
