//! Print the cached inventory document for ansible-style consumers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use pmm_connect::blob_cache::{self, BlobCache, BlobConfig, BlobFetcher, ERROR_DOCUMENT};
use pmm_connect::config::{LogFormat, LogLevel};
use pmm_connect::logging;

#[derive(Parser, Debug)]
#[command(version, about = "Fetch the inventory blob and print it")]
struct Args {
    /// Inventory fetch configuration
    #[arg(short, long, env = "GASCAN_INVENTORY_CONFIG_FILE", default_value_os_t = BlobConfig::default_path())]
    config_file: PathBuf,

    /// Print a sample config and exit
    #[arg(short = 's', long)]
    generate_sample: bool,

    /// Accepted for inventory-script compatibility; the whole document is always printed
    #[arg(long, hide = true)]
    list: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(LogLevel::Warning, LogFormat::Text);

    if args.generate_sample {
        match serde_json::to_string_pretty(&blob_cache::sample_config()) {
            Ok(sample) => println!("{sample}"),
            Err(e) => {
                error!(error = %e, "failed to render sample config");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let document = BlobConfig::load(&args.config_file)
        .and_then(|config| BlobFetcher::new(config, BlobCache::from_env()))
        .map(|fetcher| fetcher.fetch())
        .unwrap_or_else(|e| {
            error!(path = %args.config_file.display(), error = %e, "unable to load inventory config");
            ERROR_DOCUMENT.to_string()
        });
    println!("{document}");
    ExitCode::SUCCESS
}
