use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zipscan")]
#[command(version)]
#[command(about = "List ZIP archive metadata from files or HTTP URLs", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipscan data.zip                     list entries via the central directory\n  \
  zipscan -v data.zip                  verbose listing with sizes, CRCs and offsets\n  \
  zipscan --forward data.zip           walk local headers instead of the CD\n  \
  zipscan --comment data.zip           print the archive comment\n  \
  zipscan -p docs/readme.md data.zip   dump one entry's stored bytes to stdout\n  \
  zipscan https://example.com/big.zip  list a remote archive via Range requests")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// List verbosely (method, sizes, CRC, dates, offsets)
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Walk local file headers from the start instead of the central directory
    #[arg(long)]
    pub forward: bool,

    /// Print the archive comment after the listing
    #[arg(long)]
    pub comment: bool,

    /// EOCD search budget in bytes (0 = unbounded)
    #[arg(long, value_name = "BYTES")]
    pub max_search: Option<u64>,

    /// Write one entry's stored (still-compressed) bytes to stdout
    #[arg(short = 'p', value_name = "NAME", conflicts_with = "forward")]
    pub pipe: Option<String>,

    /// Quiet mode: suppress summary lines
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }
}
