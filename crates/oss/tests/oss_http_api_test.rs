//! OSS HTTP API Integration Tests
//!
//! Tests for the OSS transport against a mock HTTP server. These tests verify
//! the requests the transport actually sends and how responses are mapped.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use bf_core::alias::RetryConfig;
    use bf_core::transport::{CompletedPart, ObjectTransport};
    use bf_core::{Alias, BucketLookup, Directory, Error, MultipartConfig, ObjectHeaders, Saved};
    use bf_oss::{OssTransport, RequestSigner};
    use bytes::Bytes;
    use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Helper to create a transport without retries for the mock server
    fn create_test_transport(endpoint: String) -> OssTransport {
        let mut alias = Alias::new("test", endpoint, "access", "secret");
        alias.bucket_lookup = BucketLookup::Path;
        alias.retry = Some(RetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        });
        OssTransport::new(alias).unwrap()
    }

    #[tokio::test]
    async fn test_put_object_from_buffer_sends_headers_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/bucket/docs/a.txt"))
            .and(header("content-type", "text/plain"))
            .and(header("x-oss-meta-owner", "alice"))
            .and(body_string("hello"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri());
        let headers = ObjectHeaders::new()
            .with("Content-Type", "text/plain")
            .with("x-oss-meta-owner", "alice");
        let response = oss
            .put_object_from_buffer("bucket", "docs/a.txt", Bytes::from("hello"), &headers)
            .await
            .unwrap();

        assert_eq!(response.get("ETag"), Some("\"abc123\""));
    }

    #[tokio::test]
    async fn test_put_object_streams_local_file() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/bucket/upload.log"))
            .and(header("content-length", "11"))
            .and(body_string("line1\nline2"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"file\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut local = tempfile::NamedTempFile::new().unwrap();
        local.write_all(b"line1\nline2").unwrap();

        let oss = create_test_transport(mock_server.uri());
        oss.put_object("bucket", "upload.log", local.path(), &ObjectHeaders::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_object_returns_body_and_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bucket/a.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-oss-meta-owner", "alice")
                    .insert_header("x-oss-object-type", "Normal")
                    .set_body_string("content"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri());
        let (data, headers) = oss.get_object("bucket", "a.txt").await.unwrap();

        assert_eq!(&data[..], b"content");
        assert_eq!(headers.get("x-oss-meta-owner"), Some("alice"));
        assert_eq!(headers.get("X-Oss-Object-Type"), Some("Normal"));
    }

    #[tokio::test]
    async fn test_head_missing_object_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/bucket/missing.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri());
        let err = oss.head_object("bucket", "missing.txt").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_error_body_becomes_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/bucket/locked.txt"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "<Error><Code>AccessDenied</Code><Message>Access denied.</Message></Error>",
            ))
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri());
        let err = oss.delete_object("bucket", "locked.txt").await.unwrap_err();

        assert!(matches!(err, Error::Auth { status: 403, .. }));
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("AccessDenied: Access denied."));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/bucket/flaky.txt"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let mut alias = Alias::new("test", mock_server.uri(), "access", "secret");
        alias.retry = Some(RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        });
        let oss = OssTransport::new(alias).unwrap();
        let err = oss.head_object("bucket", "flaky.txt").await.unwrap_err();

        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_copy_object_sends_source_and_directive() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/archive/b.txt"))
            .and(header("x-oss-copy-source", "/bucket/dir/a%20b.txt"))
            .and(header("x-oss-metadata-directive", "REPLACE"))
            .and(header("x-oss-meta-state", "archived"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri());
        let headers = ObjectHeaders::new().with("x-oss-meta-state", "archived");
        oss.copy_object("bucket", "dir/a b.txt", "archive", "b.txt", &headers)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_multipart_calls() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bucket/big.bin"))
            .and(query_param("uploads", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<InitiateMultipartUploadResult><Bucket>bucket</Bucket><Key>big.bin</Key>\
                 <UploadId>up-1</UploadId></InitiateMultipartUploadResult>",
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/bucket/big.bin"))
            .and(query_param("partNumber", "1"))
            .and(query_param("uploadId", "up-1"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"part-1\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/bucket/big.bin"))
            .and(query_param("uploadId", "up-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ListPartsResult><Part><PartNumber>1</PartNumber><ETag>\"part-1\"</ETag>\
                 <Size>4</Size></Part></ListPartsResult>",
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/bucket/big.bin"))
            .and(query_param("uploadId", "up-1"))
            .and(header("content-type", "application/xml"))
            .and(body_string_contains("<PartNumber>1</PartNumber>"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/bucket/big.bin"))
            .and(query_param("uploadId", "up-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri());
        let upload_id = oss
            .initiate_multipart_upload("bucket", "big.bin", &ObjectHeaders::new())
            .await
            .unwrap();
        assert_eq!(upload_id, "up-1");

        let etag = oss
            .upload_part("bucket", "big.bin", &upload_id, 1, Bytes::from("data"))
            .await
            .unwrap();
        assert_eq!(etag, "\"part-1\"");

        let parts = oss.list_parts("bucket", "big.bin", &upload_id).await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].size, 4);

        let completed: Vec<CompletedPart> = parts.iter().map(CompletedPart::from).collect();
        oss.complete_multipart_upload("bucket", "big.bin", &upload_id, &completed)
            .await
            .unwrap();
        oss.abort_multipart_upload("bucket", "big.bin", &upload_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_multipart_uploads() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bucket/"))
            .and(query_param("uploads", ""))
            .and(query_param("prefix", "big"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ListMultipartUploadsResult><Bucket>bucket</Bucket>\
                 <Upload><Key>big.bin</Key><UploadId>up-1</UploadId></Upload>\
                 <Upload><Key>big.bin.bak</Key><UploadId>up-2</UploadId></Upload>\
                 </ListMultipartUploadsResult>",
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri());
        let uploads = oss.list_multipart_uploads("bucket", "big").await.unwrap();

        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].key, "big.bin.bak");
        assert_eq!(uploads[1].upload_id, "up-2");
    }

    #[tokio::test]
    async fn test_vanished_upload_reports_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bucket/big.bin"))
            .and(query_param("uploadId", "gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<Error><Code>NoSuchUpload</Code></Error>",
            ))
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri());
        let err = oss.list_parts("bucket", "big.bin", "gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    struct StaticToken;

    impl RequestSigner for StaticToken {
        fn sign(&self, request: &mut reqwest::Request) -> bf_core::Result<()> {
            request
                .headers_mut()
                .insert("authorization", "OSS access:signature".parse().unwrap());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_signer_sees_every_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/bucket/a.txt"))
            .and(header("authorization", "OSS access:signature"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let oss = create_test_transport(mock_server.uri()).with_signer(Arc::new(StaticToken));
        oss.head_object("bucket", "a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_save_through_multipart() {
        let mock_server = MockServer::start().await;
        let part_size = 5 * 1024 * 1024;
        let payload = vec![b'x'; part_size + 16];

        Mock::given(method("GET"))
            .and(path("/bucket/"))
            .and(query_param("uploads", ""))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<ListMultipartUploadsResult></ListMultipartUploadsResult>"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/bucket/media/big.bin"))
            .and(query_param("uploads", ""))
            .and(header("x-oss-meta-owner", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<InitiateMultipartUploadResult><UploadId>up-9</UploadId>\
                 </InitiateMultipartUploadResult>",
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/bucket/media/big.bin"))
            .and(query_param("uploadId", "up-9"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag\""))
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/bucket/media/big.bin"))
            .and(query_param("uploadId", "up-9"))
            .and(body_string_contains("<PartNumber>2</PartNumber>"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("HEAD"))
            .and(path("/bucket/media/big.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-oss-meta-owner", "alice")
                    .insert_header("x-oss-object-type", "Multipart"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let oss = Arc::new(create_test_transport(mock_server.uri()));
        let files = Directory::new("bucket/media")
            .unwrap()
            .files(oss)
            .with_multipart(MultipartConfig::new().part_size(part_size as u64).threshold(1));

        let mut file = files.new_file("big.bin").with_body(payload);
        file.metadata_mut().insert("owner".to_string(), "alice".to_string());
        let saved = file.save(ObjectHeaders::new()).await.unwrap();

        assert_eq!(saved, Saved::Confirmed);
        assert_eq!(file.attributes.content_length, Some(part_size as u64 + 16));
        assert_eq!(file.attributes.object_type.as_deref(), Some("Multipart"));
    }
}
