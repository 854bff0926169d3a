use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dscify")]
#[command(version)]
#[command(about = "Extract symbols from dyld shared caches and Apple firmware", long_about = None)]
#[command(after_help = "Examples:\n  \
  dscify download > ipsws.json                          list firmwares for all devices\n  \
  dscify extract dyld_shared_cache_arm64e out/          expand a local cache\n  \
  dscify extract-ipsw https://example.com/x.ipsw out/   expand the cache inside a remote ipsw")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,

    /// More logging (-vv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download the ipsw list from ipsw.me
    Download {
        /// Concurrent device requests
        #[arg(long, default_value_t = 16)]
        concurrency: usize,
    },

    /// Extract symbols from a dyld_shared_cache
    Extract {
        /// Path to dsc_extractor.bundle (default: from xcode-select)
        #[arg(long, value_name = "PATH")]
        extractor: Option<PathBuf>,

        /// Shared cache file
        #[arg(value_name = "CACHE")]
        path: PathBuf,

        /// Output directory (replaced)
        #[arg(value_name = "DEST")]
        dest_path: PathBuf,
    },

    /// Extract symbols from an ipsw file or URL
    ExtractIpsw {
        /// Path to dsc_extractor.bundle (default: from xcode-select)
        #[arg(long, value_name = "PATH")]
        extractor: Option<PathBuf>,

        /// ipsw path or HTTP URL
        #[arg(value_name = "IPSW")]
        path: String,

        /// Output directory (replaced)
        #[arg(value_name = "DEST")]
        dest_path: PathBuf,
    },
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    /// Default log filter for the verbosity flags; `RUST_LOG` overrides it.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (q, _) if q > 1 => "error",
            (1, _) => "warn",
            (_, 0) => "info",
            (_, 1) => "debug",
            _ => "trace",
        }
    }
}

pub fn is_http_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_extract_ipsw_args() {
        let cli = Cli::parse_from([
            "dscify",
            "-q",
            "extract-ipsw",
            "--extractor",
            "/x/dsc_extractor.bundle",
            "https://example.com/a.ipsw",
            "out",
        ]);
        assert_eq!(cli.log_filter(), "warn");
        match cli.command {
            Command::ExtractIpsw {
                extractor,
                path,
                dest_path,
            } => {
                assert_eq!(extractor, Some(PathBuf::from("/x/dsc_extractor.bundle")));
                assert!(is_http_url(&path));
                assert_eq!(dest_path, PathBuf::from("out"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::parse_from(["dscify", "download", "-vv"]);
        assert_eq!(cli.log_filter(), "trace");
        assert!(!is_http_url("./local.ipsw"));
    }
}
