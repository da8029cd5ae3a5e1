//! OSS transport implementation
//!
//! Speaks the OSS REST protocol over reqwest and implements the
//! ObjectTransport trait from bf-core.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::io::ReaderStream;
use url::Url;

use bf_core::alias::RetryConfig;
use bf_core::metadata::OSS_META_PREFIX;
use bf_core::transport::{self, CompletedPart, ObjectTransport, Part, UploadEntry};
use bf_core::wire;
use bf_core::{Alias, Error, ObjectHeaders, Result};

use crate::signer::{Anonymous, RequestSigner};

const COPY_SOURCE: &str = "x-oss-copy-source";
const METADATA_DIRECTIVE: &str = "x-oss-metadata-directive";

/// OSS transport over HTTP
pub struct OssTransport {
    http: reqwest::Client,
    alias: Alias,
    retry: RetryConfig,
    signer: Arc<dyn RequestSigner>,
}

impl OssTransport {
    /// Create a transport for an alias, sending unsigned requests
    pub fn new(alias: Alias) -> Result<Self> {
        let timeout = alias.timeout_config();
        if alias.insecure {
            tracing::warn!(alias = %alias.name, "TLS certificate verification disabled");
        }

        let http = reqwest::Client::builder()
            .connect_timeout(timeout.connect())
            .read_timeout(timeout.read())
            .danger_accept_invalid_certs(alias.insecure)
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            retry: alias.retry_config(),
            alias,
            signer: Arc::new(Anonymous),
        })
    }

    /// Replace the request signer
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    fn object_location(&self, bucket: &str, path: &str) -> Result<Url> {
        transport::object_url(&self.alias.endpoint, bucket, path, self.alias.path_style())
    }

    fn bucket_location(&self, bucket: &str) -> Result<Url> {
        transport::object_url(&self.alias.endpoint, bucket, "", self.alias.path_style())
    }

    fn upload_location(&self, bucket: &str, path: &str, upload_id: &str) -> Result<Url> {
        let mut url = self.object_location(bucket, path)?;
        url.query_pairs_mut().append_pair("uploadId", upload_id);
        Ok(url)
    }

    /// Sign, send and retry a request, mapping failures to bf-core errors
    ///
    /// Requests with a streaming body cannot be cloned and are sent once.
    async fn send(&self, builder: RequestBuilder, target: &str) -> Result<Response> {
        let mut request = builder
            .build()
            .map_err(|e| Error::General(format!("Invalid request for {target}: {e}")))?;
        self.signer.sign(&mut request)?;

        let mut backoff = self.retry.initial_backoff();
        let mut attempt = 1;
        loop {
            let again = if attempt < self.retry.max_attempts {
                request.try_clone()
            } else {
                None
            };
            tracing::debug!(method = %request.method(), url = %request.url(), attempt, "OSS request");

            let outcome = self.http.execute(request).await;
            let retryable = match &outcome {
                Ok(response) => response.status().is_server_error(),
                Err(e) => e.is_connect() || e.is_timeout(),
            };

            match again {
                Some(next) if retryable => {
                    tracing::warn!(object = target, attempt, ?backoff, "Retrying OSS request");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.retry.max_backoff());
                    attempt += 1;
                    request = next;
                }
                _ => return check_response(outcome, target).await,
            }
        }
    }

    async fn send_text(&self, builder: RequestBuilder, target: &str) -> Result<String> {
        let response = self.send(builder, target).await?;
        response
            .text()
            .await
            .map_err(|e| Error::Network(format!("{target}: {e}")))
    }
}

async fn check_response(outcome: reqwest::Result<Response>, target: &str) -> Result<Response> {
    let response = outcome.map_err(|e| Error::Network(format!("{target}: {e}")))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(Error::NotFound(target.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = wire::parse_error_response(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    Err(Error::from_status(status.as_u16(), format!("{target}: {message}")))
}

fn with_headers(mut builder: RequestBuilder, headers: &ObjectHeaders) -> RequestBuilder {
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
}

fn response_headers(response: &Response) -> ObjectHeaders {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| match value.to_str() {
            Ok(value) => Some((name.as_str(), value)),
            Err(_) => {
                tracing::debug!(header = %name, "Skipping non-ASCII response header");
                None
            }
        })
        .collect()
}

/// Percent-encoded `/bucket/path` as the copy header expects it
fn copy_source(bucket: &str, path: &str) -> Result<String> {
    let url = transport::object_url("http://copy.invalid", bucket, path, true)?;
    Ok(url.path().to_string())
}

#[async_trait]
impl ObjectTransport for OssTransport {
    fn metadata_prefix(&self) -> &str {
        OSS_META_PREFIX
    }

    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        file: &Path,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders> {
        let target = format!("{bucket}/{path}");
        let local = tokio::fs::File::open(file).await?;
        let size = local.metadata().await?.len();
        tracing::debug!(bucket, path, file = %file.display(), size, "PUT object from file");

        let body = reqwest::Body::wrap_stream(ReaderStream::new(local));
        let request = with_headers(self.http.put(self.object_location(bucket, path)?), headers)
            .header(CONTENT_LENGTH, size)
            .body(body);
        let response = self.send(request, &target).await?;
        Ok(response_headers(&response))
    }

    async fn put_object_from_buffer(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        headers: &ObjectHeaders,
    ) -> Result<ObjectHeaders> {
        tracing::debug!(bucket, path, size = data.len(), "PUT object from buffer");
        let request =
            with_headers(self.http.put(self.object_location(bucket, path)?), headers).body(data);
        let response = self.send(request, &format!("{bucket}/{path}")).await?;
        Ok(response_headers(&response))
    }

    async fn get_object(&self, bucket: &str, path: &str) -> Result<(Bytes, ObjectHeaders)> {
        let target = format!("{bucket}/{path}");
        let response = self
            .send(self.http.get(self.object_location(bucket, path)?), &target)
            .await?;
        let headers = response_headers(&response);
        let data = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("{target}: {e}")))?;
        Ok((data, headers))
    }

    async fn head_object(&self, bucket: &str, path: &str) -> Result<ObjectHeaders> {
        let response = self
            .send(
                self.http.head(self.object_location(bucket, path)?),
                &format!("{bucket}/{path}"),
            )
            .await?;
        Ok(response_headers(&response))
    }

    async fn delete_object(&self, bucket: &str, path: &str) -> Result<()> {
        self.send(
            self.http.delete(self.object_location(bucket, path)?),
            &format!("{bucket}/{path}"),
        )
        .await?;
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_path: &str,
        dst_bucket: &str,
        dst_path: &str,
        headers: &ObjectHeaders,
    ) -> Result<()> {
        tracing::debug!(src_bucket, src_path, dst_bucket, dst_path, "Copy object");
        let destination = self.object_location(dst_bucket, dst_path)?;
        let mut request = with_headers(self.http.put(destination), headers)
            .header(COPY_SOURCE, copy_source(src_bucket, src_path)?);
        if !headers.is_empty() {
            request = request.header(METADATA_DIRECTIVE, "REPLACE");
        }
        self.send(request, &format!("{src_bucket}/{src_path}")).await?;
        Ok(())
    }

    async fn object_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Option<Duration>,
    ) -> Result<String> {
        let url = self.object_location(bucket, path)?;
        match expires_in {
            None => Ok(url.to_string()),
            Some(expires_in) => Ok(self.signer.presign("GET", url, expires_in)?.to_string()),
        }
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<UploadEntry>> {
        let mut url = self.bucket_location(bucket)?;
        url.query_pairs_mut()
            .append_key_only("uploads")
            .append_pair("prefix", prefix);
        let body = self.send_text(self.http.get(url), bucket).await?;
        wire::parse_list_uploads_response(&body)
    }

    async fn list_parts(&self, bucket: &str, path: &str, upload_id: &str) -> Result<Vec<Part>> {
        let url = self.upload_location(bucket, path, upload_id)?;
        let body = self
            .send_text(self.http.get(url), &format!("upload {upload_id}"))
            .await?;
        wire::parse_list_parts_response(&body)
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        headers: &ObjectHeaders,
    ) -> Result<String> {
        let mut url = self.object_location(bucket, path)?;
        url.query_pairs_mut().append_key_only("uploads");
        let body = self
            .send_text(with_headers(self.http.post(url), headers), &format!("{bucket}/{path}"))
            .await?;
        let upload_id = wire::parse_initiate_response(&body)?;
        tracing::debug!(bucket, path, upload_id, "Initiated multipart upload");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        path: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let mut url = self.object_location(bucket, path)?;
        url.query_pairs_mut()
            .append_pair("partNumber", &part_number.to_string())
            .append_pair("uploadId", upload_id);
        let response = self
            .send(
                self.http.put(url).body(data),
                &format!("part {part_number} of upload {upload_id}"),
            )
            .await?;

        response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::MultipartIntegrity(format!("part {part_number} was stored without an ETag"))
            })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let body = wire::complete_multipart_upload_body(parts)?;
        let url = self.upload_location(bucket, path, upload_id)?;
        self.send(
            self.http
                .post(url)
                .header(CONTENT_TYPE, "application/xml")
                .body(body),
            &format!("upload {upload_id}"),
        )
        .await?;
        tracing::debug!(bucket, path, upload_id, parts = parts.len(), "Completed multipart upload");
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        upload_id: &str,
    ) -> Result<()> {
        let url = self.upload_location(bucket, path, upload_id)?;
        self.send(self.http.delete(url), &format!("upload {upload_id}")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oss_transport(bucket_lookup: &str) -> OssTransport {
        let mut alias = Alias::new("test", "http://oss.example.com", "access", "secret");
        alias.bucket_lookup = bucket_lookup.parse().unwrap();
        OssTransport::new(alias).unwrap()
    }

    #[test]
    fn test_copy_source_is_encoded() {
        assert_eq!(copy_source("bucket", "a/b c.txt").unwrap(), "/bucket/a/b%20c.txt");
    }

    #[test]
    fn test_locations() {
        let oss = oss_transport("path");
        assert_eq!(
            oss.upload_location("bucket", "big.bin", "abc").unwrap().as_str(),
            "http://oss.example.com/bucket/big.bin?uploadId=abc"
        );
        assert_eq!(
            oss.bucket_location("bucket").unwrap().as_str(),
            "http://oss.example.com/bucket/"
        );

        let oss = oss_transport("dns");
        assert_eq!(
            oss.object_location("bucket", "a.txt").unwrap().as_str(),
            "http://bucket.oss.example.com/a.txt"
        );
    }

    #[tokio::test]
    async fn test_public_url() {
        let url = oss_transport("path")
            .object_url("bucket", "dir/a.txt", None)
            .await
            .unwrap();
        assert_eq!(url, "http://oss.example.com/bucket/dir/a.txt");
    }

    #[tokio::test]
    async fn test_expiring_url_needs_capable_signer() {
        let err = oss_transport("path")
            .object_url("bucket", "a.txt", Some(Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[test]
    fn test_metadata_prefix() {
        assert_eq!(oss_transport("auto").metadata_prefix(), "x-oss-meta-");
    }
}
