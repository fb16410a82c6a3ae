//! S3 multipart protocol module
//!
//! The upload coordinator talks to the object store through two seams:
//!
//! - [`MultipartProtocol`]: open / presign part upload / complete / abort
//! - [`PartTransfer`]: PUT of one part's bytes to a presigned URL
//!
//! Production implementations are [`S3Protocol`] (AWS SDK) and
//! [`HttpTransfer`] (reqwest).
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | CreateMultipartUpload | `s3.create_multipart_upload` | bucket, key, upload_id |
//! | Presign UploadPart | `s3.presign_upload_part` | upload_id, part_number |
//! | UploadPart (PUT) | `s3.upload_part` | bytes, status_code, etag |
//! | CompleteMultipartUpload | `s3.complete_multipart_upload` | upload_id, parts_count |
//! | AbortMultipartUpload | `s3.abort_multipart_upload` | upload_id |

pub mod client;
pub mod transfer;

pub use client::S3Protocol;
pub use transfer::HttpTransfer;

use crate::pool::Checksum;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// S3 errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("S3 request failed: {0}")]
    Sdk(String),

    #[error("Presigning failed: {0}")]
    Presign(String),

    #[error("Transfer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP Status: {status}\n{body}")]
    Status { status: u16, body: String },

    #[error("Response missing ETag")]
    MissingETag,

    #[error("Response missing upload id")]
    MissingUploadId,
}

impl S3Error {
    /// HTTP status of a rejected transfer
    pub fn status(&self) -> Option<u16> {
        match self {
            S3Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Target object of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub bucket: String,
    pub key: String,
}

impl Destination {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Destination for `file` under a `bucket/path` location
    ///
    /// The object key is the path prefix joined with the file name. Returns
    /// `None` when the location has no `/` separating the bucket or the
    /// file has no name.
    pub fn for_file(bucket_path: &str, file: &Path) -> Option<Self> {
        let (bucket, prefix) = bucket_path.split_once('/')?;
        if bucket.is_empty() {
            return None;
        }

        let file_name = file.file_name()?.to_str()?;
        let prefix = prefix.trim_matches('/');
        let key = if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        };

        Some(Self::new(bucket, key))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Proof that one part was accepted by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionToken {
    pub part_number: u32,
    pub etag: String,
    pub checksum: Checksum,
}

/// Presigned part upload target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedPart {
    pub url: String,
    /// Headers that must accompany the PUT for the signature to hold
    pub headers: Vec<(String, String)>,
}

impl PresignedPart {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }
}

/// Multipart session operations
#[async_trait]
pub trait MultipartProtocol: Send + Sync {
    /// Start a multipart upload and return its upload id
    async fn open(&self, destination: &Destination, content_type: &str)
        -> Result<String, S3Error>;

    /// Presigned target for uploading one part
    async fn presign_part_upload(
        &self,
        destination: &Destination,
        upload_id: &str,
        part_number: u32,
        checksum: &Checksum,
        validity: Duration,
    ) -> Result<PresignedPart, S3Error>;

    /// Commit the upload; `parts` are sorted by part number without gaps
    async fn complete(
        &self,
        destination: &Destination,
        upload_id: &str,
        parts: &[CompletionToken],
    ) -> Result<(), S3Error>;

    /// Abort the upload; aborting a finished or aborted upload is not an error
    async fn abort(&self, destination: &Destination, upload_id: &str) -> Result<(), S3Error>;
}

/// Part byte transfer
#[async_trait]
pub trait PartTransfer: Send + Sync {
    /// PUT `body` to `target` and return the ETag assigned by the store
    async fn put(
        &self,
        target: &PresignedPart,
        checksum: &Checksum,
        body: Bytes,
    ) -> Result<String, S3Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_for_file() {
        let dest = Destination::for_file("my-bucket/backups/2024", Path::new("/data/large.bin"));
        assert_eq!(
            dest,
            Some(Destination::new("my-bucket", "backups/2024/large.bin"))
        );
    }

    #[test]
    fn test_destination_for_file_bucket_root() {
        let dest = Destination::for_file("my-bucket/", Path::new("large.bin")).unwrap();
        assert_eq!(dest.key, "large.bin");
        assert_eq!(dest.to_string(), "s3://my-bucket/large.bin");
    }

    #[test]
    fn test_destination_requires_separator() {
        assert!(Destination::for_file("my-bucket", Path::new("large.bin")).is_none());
        assert!(Destination::for_file("/path", Path::new("large.bin")).is_none());
    }

    #[test]
    fn test_status_error_message() {
        let err = S3Error::Status {
            status: 403,
            body: "AccessDenied".into(),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.to_string(), "HTTP Status: 403\nAccessDenied");
    }
}
