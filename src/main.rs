//! Multipart Uploadr - Concurrent S3 multipart upload of very large files
//!
//! Splits a file into memory-mapped parts and uploads them in parallel
//! through presigned part URLs.

use anyhow::Context;
use clap::Parser;
use multipart_uploadr::{
    config::Config,
    pool::ChecksumAlgorithm,
    s3::{Destination, HttpTransfer, S3Protocol},
    upload::{UploadCoordinator, UploadSettings},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Multipart Uploadr - Upload a large file to S3 as a concurrent multipart upload
#[derive(Parser, Debug)]
#[command(name = "multipart-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to upload
    file: PathBuf,

    /// Target location as `bucket/path`; the object key is `path/<file name>`
    bucket_path: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Target part size in bytes
    #[arg(long)]
    part_size: Option<u64>,

    /// Part transfers in flight at once
    #[arg(long)]
    max_transfers: Option<usize>,

    /// Checksum sent with every part
    #[arg(long, value_enum)]
    checksum: Option<ChecksumAlgorithm>,

    /// Content type of the uploaded object, guessed from the file extension if omitted
    #[arg(long)]
    content_type: Option<String>,
}

/// Explicit content type, else a guess from the extension, else `application/octet-stream`
fn content_type_for(file: &Path, explicit: Option<&str>) -> String {
    match explicit {
        Some(content_type) => content_type.to_string(),
        None => mime_guess::from_path(file)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

fn init_logging(log_level: &str, json: bool) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Multipart Uploadr v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    if let Some(part_size) = args.part_size {
        config.upload.part_size = part_size;
    }
    if let Some(max_transfers) = args.max_transfers {
        config.upload.max_concurrent_transfers = max_transfers;
    }
    if let Some(checksum) = args.checksum {
        config.upload.checksum = checksum;
    }
    config.validate()?;

    let destination = Destination::for_file(&args.bucket_path, &args.file).with_context(|| {
        format!(
            "Invalid target '{}' for {:?}: expected bucket/path",
            args.bucket_path, args.file
        )
    })?;

    let protocol = S3Protocol::from_config(&config.s3, config.upload.checksum).await;
    if !protocol.check_bucket_exists(&destination.bucket).await? {
        anyhow::bail!("Bucket '{}' does not exist", destination.bucket);
    }

    let transfer =
        HttpTransfer::new(config.upload.request_timeout_secs.map(Duration::from_secs))?;
    let coordinator = UploadCoordinator::new(
        Arc::new(protocol),
        Arc::new(transfer),
        UploadSettings::from(&config.upload),
    );

    let content_type = content_type_for(&args.file, args.content_type.as_deref());
    let result = coordinator
        .upload_file(&args.file, &destination, &content_type)
        .await;

    if config.metrics.enabled {
        if let Some(textfile) = &config.metrics.textfile {
            if let Err(e) = multipart_uploadr::metrics::write_textfile(textfile) {
                tracing::warn!(path = ?textfile, error = %e, "Failed to write metrics");
            }
        }
    }

    let outcome = result?;
    info!(
        destination = %outcome.destination,
        upload_id = %outcome.upload_id,
        parts = outcome.parts.len(),
        bytes = outcome.total_bytes,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        mib_per_sec = format!("{:.1}", outcome.throughput() / (1024.0 * 1024.0)),
        "Upload completed"
    );

    Ok(())
}
