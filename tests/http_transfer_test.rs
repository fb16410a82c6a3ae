//! HTTP Part Transfer Integration Tests
//!
//! ## Test Coverage
//!
//! - PUT of part bytes with the checksum header
//! - Presigned headers are forwarded
//! - ETag extraction
//! - Non-2xx responses and missing ETags surface as errors

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use multipart_uploadr::pool::{ChecksumAlgorithm, DigestPool};
    use multipart_uploadr::s3::{HttpTransfer, PartTransfer, PresignedPart, S3Error};
    use std::time::Duration;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transfer() -> HttpTransfer {
        HttpTransfer::new(Some(Duration::from_secs(5))).unwrap()
    }

    // ========================================================================
    // TEST: Successful PUT
    // ========================================================================

    #[tokio::test]
    async fn test_put_returns_etag() {
        let mock_server = MockServer::start().await;
        let checksum = DigestPool::new(ChecksumAlgorithm::Md5, 1).checksum(b"part data");

        Mock::given(method("PUT"))
            .and(path("/bucket/key.bin"))
            .and(header("content-md5", checksum.to_base64().as_str()))
            .and(body_bytes(b"part data".to_vec()))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let target = PresignedPart::new(format!(
            "{}/bucket/key.bin?partNumber=1&uploadId=u1",
            mock_server.uri()
        ));
        let etag = transfer()
            .put(&target, &checksum, Bytes::from_static(b"part data"))
            .await
            .unwrap();

        assert_eq!(etag, "\"abc123\"");
    }

    #[tokio::test]
    async fn test_put_forwards_presigned_headers() {
        let mock_server = MockServer::start().await;
        let checksum = DigestPool::new(ChecksumAlgorithm::Sha256, 1).checksum(b"data");

        Mock::given(method("PUT"))
            .and(header("x-amz-checksum-sha256", checksum.to_base64().as_str()))
            .and(header("x-amz-meta-test", "signed"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"sha\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut target = PresignedPart::new(format!("{}/bucket/key.bin", mock_server.uri()));
        target
            .headers
            .push(("x-amz-meta-test".to_string(), "signed".to_string()));
        target.headers.push((
            "x-amz-checksum-sha256".to_string(),
            checksum.to_base64(),
        ));

        let etag = transfer()
            .put(&target, &checksum, Bytes::from_static(b"data"))
            .await
            .unwrap();

        assert_eq!(etag, "\"sha\"");
    }

    // ========================================================================
    // TEST: Failures
    // ========================================================================

    #[tokio::test]
    async fn test_put_error_status() {
        let mock_server = MockServer::start().await;
        let checksum = DigestPool::new(ChecksumAlgorithm::Md5, 1).checksum(b"data");

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
            .mount(&mock_server)
            .await;

        let target = PresignedPart::new(format!("{}/bucket/key.bin", mock_server.uri()));
        let err = transfer()
            .put(&target, &checksum, Bytes::from_static(b"data"))
            .await
            .unwrap_err();

        match err {
            S3Error::Status { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "SignatureDoesNotMatch");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_put_without_etag() {
        let mock_server = MockServer::start().await;
        let checksum = DigestPool::new(ChecksumAlgorithm::Md5, 1).checksum(b"data");

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let target = PresignedPart::new(format!("{}/bucket/key.bin", mock_server.uri()));
        let err = transfer()
            .put(&target, &checksum, Bytes::from_static(b"data"))
            .await
            .unwrap_err();

        assert!(matches!(err, S3Error::MissingETag));
    }

    #[tokio::test]
    async fn test_put_timeout_is_request_error() {
        let mock_server = MockServer::start().await;
        let checksum = DigestPool::new(ChecksumAlgorithm::Md5, 1).checksum(b"data");

        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"late\"")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let target = PresignedPart::new(format!("{}/bucket/key.bin", mock_server.uri()));
        let err = HttpTransfer::new(Some(Duration::from_millis(100)))
            .unwrap()
            .put(&target, &checksum, Bytes::from_static(b"data"))
            .await
            .unwrap_err();

        assert!(matches!(err, S3Error::Request(ref e) if e.is_timeout()));
    }
}
