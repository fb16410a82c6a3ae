//! AWS SDK backed multipart protocol

use super::{CompletionToken, Destination, MultipartProtocol, PresignedPart, S3Error};
use crate::config::S3Config;
use crate::pool::{Checksum, ChecksumAlgorithm};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{
    ChecksumAlgorithm as S3ChecksumAlgorithm, CompletedMultipartUpload, CompletedPart,
};
use aws_sdk_s3::Client;
use std::time::Duration;

fn sdk_error<E: std::error::Error>(e: E) -> S3Error {
    S3Error::Sdk(DisplayErrorContext(e).to_string())
}

/// Multipart protocol over the AWS SDK
#[derive(Debug, Clone)]
pub struct S3Protocol {
    client: Client,
    checksum: ChecksumAlgorithm,
}

impl S3Protocol {
    pub fn from_client(client: Client, checksum: ChecksumAlgorithm) -> Self {
        Self { client, checksum }
    }

    /// Build an SDK client from configuration
    ///
    /// Static keys from the configuration take precedence over the default
    /// credential chain. A custom endpoint switches to path-style addressing.
    pub async fn from_config(config: &S3Config, checksum: ChecksumAlgorithm) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "multipart-uploadr-config",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = config.endpoint() {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::debug!(
            region = %config.region,
            endpoint = ?config.endpoint(),
            "Created S3 client"
        );

        Self::from_client(Client::from_conf(builder.build()), checksum)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Check that `bucket` exists and is reachable with our credentials
    pub async fn check_bucket_exists(&self, bucket: &str) -> Result<bool, S3Error> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => Ok(false),
            Err(e) => Err(sdk_error(e)),
        }
    }
}

#[async_trait]
impl MultipartProtocol for S3Protocol {
    #[tracing::instrument(
        name = "s3.create_multipart_upload",
        skip(self),
        fields(
            s3.bucket = %destination.bucket,
            s3.key = %destination.key,
            s3.upload_id = tracing::field::Empty
        ),
        err
    )]
    async fn open(
        &self,
        destination: &Destination,
        content_type: &str,
    ) -> Result<String, S3Error> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .content_type(content_type);
        if self.checksum == ChecksumAlgorithm::Sha256 {
            request = request.checksum_algorithm(S3ChecksumAlgorithm::Sha256);
        }

        let output = request.send().await.map_err(sdk_error)?;
        let upload_id = output
            .upload_id()
            .map(str::to_string)
            .ok_or(S3Error::MissingUploadId)?;

        tracing::Span::current().record("s3.upload_id", upload_id.as_str());
        Ok(upload_id)
    }

    #[tracing::instrument(
        name = "s3.presign_upload_part",
        skip(self, destination, checksum),
        fields(s3.upload_id = %upload_id, s3.part_number = part_number),
        err
    )]
    async fn presign_part_upload(
        &self,
        destination: &Destination,
        upload_id: &str,
        part_number: u32,
        checksum: &Checksum,
        validity: Duration,
    ) -> Result<PresignedPart, S3Error> {
        let request = self
            .client
            .upload_part()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .upload_id(upload_id)
            .part_number(part_number as i32);
        let request = match checksum.algorithm() {
            ChecksumAlgorithm::Md5 => request.content_md5(checksum.to_base64()),
            ChecksumAlgorithm::Sha256 => request
                .checksum_algorithm(S3ChecksumAlgorithm::Sha256)
                .checksum_sha256(checksum.to_base64()),
        };

        let presigning =
            PresigningConfig::expires_in(validity).map_err(|e| S3Error::Presign(e.to_string()))?;
        let presigned = request.presigned(presigning).await.map_err(sdk_error)?;

        Ok(PresignedPart {
            url: presigned.uri().to_string(),
            headers: presigned
                .headers()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
    }

    #[tracing::instrument(
        name = "s3.complete_multipart_upload",
        skip(self, destination, parts),
        fields(s3.upload_id = %upload_id, parts_count = parts.len()),
        err
    )]
    async fn complete(
        &self,
        destination: &Destination,
        upload_id: &str,
        parts: &[CompletionToken],
    ) -> Result<(), S3Error> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|token| {
                let part = CompletedPart::builder()
                    .part_number(token.part_number as i32)
                    .e_tag(&token.etag);
                match token.checksum.algorithm() {
                    ChecksumAlgorithm::Sha256 => part.checksum_sha256(token.checksum.to_base64()),
                    ChecksumAlgorithm::Md5 => part,
                }
                .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(())
    }

    #[tracing::instrument(
        name = "s3.abort_multipart_upload",
        skip(self, destination),
        fields(s3.upload_id = %upload_id),
        err
    )]
    async fn abort(&self, destination: &Destination, upload_id: &str) -> Result<(), S3Error> {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&destination.bucket)
            .key(&destination.key)
            .upload_id(upload_id)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_no_such_upload()) => {
                tracing::debug!(upload_id, "Upload already gone, nothing to abort");
                Ok(())
            }
            Err(e) => Err(sdk_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3Config {
        S3Config {
            region: "us-east-1".into(),
            endpoint: Some("http://localhost:9000".into()),
            access_key: Some("test-access".into()),
            secret_key: Some("test-secret".into()),
        }
    }

    #[tokio::test]
    async fn test_presign_md5_part() {
        let protocol = S3Protocol::from_config(&test_config(), ChecksumAlgorithm::Md5).await;
        let destination = Destination::new("test-bucket", "dir/large.bin");
        let checksum = Checksum::new(ChecksumAlgorithm::Md5, vec![0u8; 16]);

        let presigned = protocol
            .presign_part_upload(
                &destination,
                "upload-123",
                7,
                &checksum,
                Duration::from_secs(600),
            )
            .await
            .unwrap();

        assert!(presigned
            .url
            .starts_with("http://localhost:9000/test-bucket/dir/large.bin"));
        assert!(presigned.url.contains("partNumber=7"));
        assert!(presigned.url.contains("uploadId=upload-123"));
        assert!(presigned.url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_presign_rejects_excessive_validity() {
        let protocol = S3Protocol::from_config(&test_config(), ChecksumAlgorithm::Md5).await;
        let destination = Destination::new("test-bucket", "large.bin");
        let checksum = Checksum::new(ChecksumAlgorithm::Md5, vec![0u8; 16]);

        let result = protocol
            .presign_part_upload(
                &destination,
                "upload-123",
                1,
                &checksum,
                Duration::from_secs(8 * 24 * 3600),
            )
            .await;

        assert!(matches!(result, Err(S3Error::Presign(_))));
    }
}
