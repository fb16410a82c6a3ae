//! HTTP part transfer to presigned URLs

use super::{PartTransfer, PresignedPart, S3Error};
use crate::pool::Checksum;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::ETAG;
use std::time::Duration;

/// PUTs part bytes with reqwest
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    /// Create a transfer with an optional per-request timeout
    ///
    /// A timed out request fails the part like any other transfer error.
    pub fn new(timeout: Option<Duration>) -> Result<Self, S3Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PartTransfer for HttpTransfer {
    #[tracing::instrument(
        name = "s3.upload_part",
        skip_all,
        fields(
            http.method = "PUT",
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty,
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn put(
        &self,
        target: &PresignedPart,
        checksum: &Checksum,
        body: Bytes,
    ) -> Result<String, S3Error> {
        let mut request = self.client.put(&target.url);

        let mut signed_checksum = false;
        for (name, value) in &target.headers {
            signed_checksum |= name.eq_ignore_ascii_case(checksum.header_name());
            request = request.header(name.as_str(), value.as_str());
        }
        if !signed_checksum {
            request = request.header(checksum.header_name(), checksum.to_base64());
        }

        let response = request.body(body).send().await?;
        let status = response.status();

        let span = tracing::Span::current();
        span.record("http.status_code", status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(S3Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(S3Error::MissingETag)?;

        span.record("s3.etag", etag.as_str());
        Ok(etag)
    }
}
