//! Multipart Uploadr Library
//!
//! Concurrent S3 multipart upload of very large files.
//!
//! # Features
//!
//! - **Memory-Mapped Parts**: Files are split into numbered parts backed by
//!   read-only maps, with small trailing remainders merged into the last part
//! - **Concurrent Transfers**: Parts are checksummed and uploaded in parallel
//!   under an admission limit
//! - **Presigned Parts**: Each part is PUT to a presigned URL
//! - **All or Nothing**: The upload is committed in part order, or aborted on
//!   the first failure
//!
//! # Example
//!
//! ```no_run
//! use multipart_uploadr::{
//!     config::Config,
//!     s3::{Destination, HttpTransfer, S3Protocol},
//!     upload::{UploadCoordinator, UploadSettings},
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let protocol = S3Protocol::from_config(&config.s3, config.upload.checksum).await;
//!     let coordinator = UploadCoordinator::new(
//!         Arc::new(protocol),
//!         Arc::new(HttpTransfer::new(None)?),
//!         UploadSettings::from(&config.upload),
//!     );
//!
//!     let destination = Destination::new("my-bucket", "backups/large.bin");
//!     let outcome = coordinator
//!         .upload_file(Path::new("large.bin"), &destination, "application/octet-stream")
//!         .await?;
//!     println!("uploaded {} parts", outcome.parts.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod pool;
pub mod s3;
pub mod split;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use split::FilePartitioner;
pub use upload::{UploadCoordinator, UploadError, UploadOutcome, UploadSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
