//! Upload module
//!
//! Uploads one large file as an S3 multipart upload: the file is split into
//! parts, parts are checksummed and transferred concurrently, and the upload
//! is committed with the completion tokens sorted by part number. Any failure
//! aborts the remote upload.

use crate::config::UploadConfig;
use crate::dispatch::DispatchError;
use crate::pool::digest::DEFAULT_POOL_CAPACITY;
use crate::pool::ChecksumAlgorithm;
use crate::s3::{CompletionToken, Destination, S3Error};
use crate::split::{PartitionPolicy, SplitError, ONE_M, SIZE_64M};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

mod coordinator;
pub mod progress;

pub use coordinator::UploadCoordinator;
pub use progress::ProgressSnapshot;

/// Minimum part size (5MB) - S3 requirement for all parts but the last
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum parts allowed
pub const MAX_PARTS: usize = 10000;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid upload configuration: {0}")]
    Configuration(#[source] SplitError),

    #[error("Source file is empty: {}", .path.display())]
    EmptySource { path: PathBuf },

    #[error("File needs {parts} parts, at most {max} are allowed")]
    TooManyParts { parts: usize, max: usize },

    #[error("Failed to open multipart upload: {0}")]
    Open(#[source] S3Error),

    #[error("Upload {upload_id} aborted: {source}")]
    Part {
        upload_id: String,
        #[source]
        source: DispatchError<PartError>,
    },

    #[error("Failed to complete upload {upload_id}: {source}")]
    Commit {
        upload_id: String,
        #[source]
        source: S3Error,
    },

    #[error("Upload {upload_id} has {actual} of {expected} parts")]
    IncompleteParts {
        upload_id: String,
        expected: usize,
        actual: usize,
    },
}

impl UploadError {
    /// Remote upload id, when the failure happened after the upload was opened
    pub fn upload_id(&self) -> Option<&str> {
        match self {
            UploadError::Part { upload_id, .. }
            | UploadError::Commit { upload_id, .. }
            | UploadError::IncompleteParts { upload_id, .. } => Some(upload_id),
            _ => None,
        }
    }
}

/// Failure of a single part
#[derive(Error, Debug)]
pub enum PartError {
    #[error("Checksum failed: {0}")]
    Checksum(String),

    #[error("Presign failed: {0}")]
    Presign(#[source] S3Error),

    #[error("Transfer failed: {0}")]
    Transfer(#[source] S3Error),
}

impl PartError {
    /// Status code of a rejected transfer
    pub fn status(&self) -> Option<u16> {
        match self {
            PartError::Transfer(e) | PartError::Presign(e) => e.status(),
            _ => None,
        }
    }
}

/// Lifecycle of one multipart upload
///
/// Transitions are one-way: `Preparing -> InFlight -> Completed | Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Remote upload opened
    Preparing,
    /// Parts dispatched
    InFlight,
    /// All parts uploaded and the commit accepted
    Completed,
    /// A part or the commit failed and the remote upload was aborted
    Aborted,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Aborted)
    }

    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        matches!(
            (self, next),
            (UploadState::Preparing, UploadState::InFlight)
                | (UploadState::Preparing, UploadState::Aborted)
                | (UploadState::InFlight, UploadState::Completed)
                | (UploadState::InFlight, UploadState::Aborted)
        )
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::Preparing => "preparing",
            UploadState::InFlight => "in_flight",
            UploadState::Completed => "completed",
            UploadState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Tunables of an upload run
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub part_size: u64,
    pub small_tail_threshold: u64,
    pub dispatch_concurrency: usize,
    pub max_concurrent_transfers: usize,
    pub pool_capacity: usize,
    pub checksum: ChecksumAlgorithm,
    pub presign_validity: Duration,
    /// How often progress is logged while parts are in flight
    pub progress_interval: Duration,
}

impl UploadSettings {
    pub fn policy(&self) -> Result<PartitionPolicy, SplitError> {
        PartitionPolicy::new(self.part_size, self.small_tail_threshold)
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            part_size: SIZE_64M,
            small_tail_threshold: ONE_M,
            dispatch_concurrency: 64,
            max_concurrent_transfers: 48,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            checksum: ChecksumAlgorithm::Md5,
            presign_validity: Duration::from_secs(600),
            progress_interval: Duration::from_secs(5),
        }
    }
}

impl From<&UploadConfig> for UploadSettings {
    fn from(config: &UploadConfig) -> Self {
        Self {
            part_size: config.part_size,
            small_tail_threshold: config.small_tail_threshold,
            dispatch_concurrency: config.dispatch_concurrency,
            max_concurrent_transfers: config.max_concurrent_transfers,
            pool_capacity: config.pool_capacity,
            checksum: config.checksum,
            presign_validity: Duration::from_secs(config.presign_validity_secs),
            ..Self::default()
        }
    }
}

/// Result of a completed upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub upload_id: String,
    pub destination: Destination,
    /// Completion tokens in part number order, as committed
    pub parts: Vec<CompletionToken>,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub progress: ProgressSnapshot,
}

impl UploadOutcome {
    /// Average throughput in bytes per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_bytes as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions_are_one_way() {
        assert!(UploadState::Preparing.can_transition_to(UploadState::InFlight));
        assert!(UploadState::InFlight.can_transition_to(UploadState::Completed));
        assert!(UploadState::InFlight.can_transition_to(UploadState::Aborted));
        assert!(!UploadState::Aborted.can_transition_to(UploadState::InFlight));
        assert!(!UploadState::Completed.can_transition_to(UploadState::Aborted));
        assert!(UploadState::Aborted.is_terminal());
    }

    #[test]
    fn test_settings_from_config() {
        let config = UploadConfig {
            part_size: 8 * ONE_M,
            presign_validity_secs: 60,
            ..UploadConfig::default()
        };

        let settings = UploadSettings::from(&config);

        assert_eq!(settings.part_size, 8 * ONE_M);
        assert_eq!(settings.presign_validity, Duration::from_secs(60));
        assert!(settings.policy().is_ok());
    }

    #[test]
    fn test_part_error_status() {
        let err = PartError::Transfer(S3Error::Status {
            status: 500,
            body: String::new(),
        });
        assert_eq!(err.status(), Some(500));
        assert_eq!(PartError::Checksum("digest task failed".into()).status(), None);
    }
}
